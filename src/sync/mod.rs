//! Cross-context change signalling
//!
//! Several independent views (tabs, windows, processes) can work on the same
//! stored project. A writer records `{timestamp, source}` under
//! [`keys::MODIFICATION_SIGNAL`] and announces it on the storage bus.
//!
//! Loop prevention is a heuristic: a signal from the same source within the
//! suppression window of the previous one is dropped. Two contexts editing
//! the same version inside that window can lose one side's notification;
//! storage itself is last-write-wins.

mod debounce;
pub mod keys;
mod watcher;

pub use debounce::DebouncedWriter;
pub use watcher::{SyncEvent, SyncWatcher};

use crate::storage::Storage;
use crate::types::Result;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Timing of the sync protocol
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Same-source signals closer than this are suppressed
    pub suppression_window_ms: u64,
    /// Period of the active-version poll
    pub poll_interval_ms: u64,
    /// Quiet time before debounced writes are flushed
    pub debounce_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            suppression_window_ms: 300,
            poll_interval_ms: 2_000,
            debounce_ms: 1_000,
        }
    }
}

impl SyncConfig {
    pub fn suppression_window(&self) -> Duration {
        Duration::from_millis(self.suppression_window_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Wall clock in milliseconds
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// The system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// The record stored under [`keys::MODIFICATION_SIGNAL`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModificationSignal {
    pub timestamp: i64,
    pub source: String,
}

/// Writes change signals with same-source suppression
pub struct ChangeSignaler {
    storage: Arc<Storage>,
    clock: Arc<dyn Clock>,
    window: Duration,
    origin: Option<String>,
}

impl ChangeSignaler {
    pub fn new(storage: Arc<Storage>, clock: Arc<dyn Clock>, window: Duration) -> Self {
        Self {
            storage,
            clock,
            window,
            origin: None,
        }
    }

    /// Tag the storage events of signals with `origin` instead of the
    /// signalling source
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// The last recorded signal. A malformed record reads as none.
    pub async fn last_signal(&self) -> Result<Option<ModificationSignal>> {
        let Some(raw) = self.storage.get_fresh(keys::MODIFICATION_SIGNAL).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(signal) => Ok(Some(signal)),
            Err(err) => {
                warn!(error = %err, "malformed modification signal ignored");
                Ok(None)
            }
        }
    }

    /// Record and announce a modification from `source`.
    ///
    /// Returns `false` when suppressed because the same source signalled
    /// within the window.
    pub async fn signal(&self, source: &str) -> Result<bool> {
        let now = self.clock.now_millis();
        if let Some(last) = self.last_signal().await? {
            let elapsed = now - last.timestamp;
            if last.source == source && elapsed < self.window.as_millis() as i64 {
                debug!(source, elapsed, "modification signal suppressed");
                return Ok(false);
            }
        }

        let record = ModificationSignal {
            timestamp: now,
            source: source.to_string(),
        };
        let raw = serde_json::to_string(&record)?;
        let origin = self.origin.as_deref().unwrap_or(source);
        self.storage.set(keys::MODIFICATION_SIGNAL, &raw, origin).await?;
        Ok(true)
    }
}
