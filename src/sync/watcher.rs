//! Merged view of pushed storage events and the active-version poll

use super::keys;
use crate::storage::{Storage, StorageEvent};
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Something another context did that this one may need to react to
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A key was written or removed
    Storage(StorageEvent),

    /// The active version id changed
    VersionChanged { previous: String, current: String },
}

/// Background task watching storage on behalf of one context
///
/// Pushed events arrive from the storage bus. Independently, the active
/// version key is polled because a switch can happen without any event
/// reaching this context. A push for the active version key is reported as
/// [`SyncEvent::VersionChanged`] when its value differs from the last one
/// seen, so each switch is delivered once whichever path notices it first.
pub struct SyncWatcher {
    events: mpsc::UnboundedReceiver<SyncEvent>,
    task: JoinHandle<()>,
}

impl SyncWatcher {
    /// Start watching. `known_version` is the version this context has loaded.
    pub fn spawn(storage: Arc<Storage>, poll_interval: Duration, known_version: String) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        let bus = storage.subscribe();
        let task = tokio::spawn(run(storage, bus, poll_interval, known_version, tx));
        Self { events, task }
    }

    /// The next event, `None` once the watcher stopped
    pub async fn next(&mut self) -> Option<SyncEvent> {
        self.events.recv().await
    }

    /// Consume the watcher as a stream
    pub fn into_stream(self) -> BoxStream<'static, SyncEvent> {
        stream::unfold(self, |mut watcher| async move {
            let event = watcher.next().await?;
            Some((event, watcher))
        })
        .boxed()
    }
}

impl Drop for SyncWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    storage: Arc<Storage>,
    mut bus: broadcast::Receiver<StorageEvent>,
    poll_interval: Duration,
    mut known_version: String,
    tx: mpsc::UnboundedSender<SyncEvent>,
) {
    let mut poll = tokio::time::interval(poll_interval);
    // The first tick completes immediately.
    poll.tick().await;

    loop {
        let event = tokio::select! {
            received = bus.recv() => match received {
                Ok(event) if event.key == keys::CURRENT_VERSION => {
                    match event.new_value {
                        Some(current) => version_change(&mut known_version, current),
                        None => None,
                    }
                }
                Ok(event) => Some(SyncEvent::Storage(event)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "sync watcher lagged behind storage events");
                    None
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = poll.tick() => match storage.get_fresh(keys::CURRENT_VERSION).await {
                Ok(Some(current)) => version_change(&mut known_version, current),
                Ok(None) => None,
                Err(err) => {
                    warn!(error = %err, "active version poll failed");
                    None
                }
            },
        };

        if let Some(event) = event {
            if tx.send(event).is_err() {
                break;
            }
        }
    }
}

fn version_change(known: &mut String, current: String) -> Option<SyncEvent> {
    if current.is_empty() || *known == current {
        return None;
    }
    debug!(previous = %known, current = %current, "active version changed");
    let previous = std::mem::replace(known, current.clone());
    Some(SyncEvent::VersionChanged { previous, current })
}
