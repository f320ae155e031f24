//! Storage implementations for metre
//!
//! Persistence is a flat string key-value space shared by every execution
//! context of a project. Each write is announced on a broadcast bus as a
//! [`StorageEvent`], the way a browser announces storage changes to other
//! windows.

mod sqlite;

pub use self::sqlite::SqliteStorage;
use crate::types::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::trace;

/// Capacity of the change bus; slow subscribers skip older events.
const EVENT_CAPACITY: usize = 256;

/// Storage configuration options
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (for testing)
    #[default]
    Memory,

    /// SQLite storage
    Sqlite {
        /// Path to the SQLite database file
        path: String,
    },
}

/// Interface for key-value storage
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get the value stored under a key
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Get the value from the backing store, bypassing any read cache.
    ///
    /// Needed for keys other connections may have written.
    async fn get_fresh(&self, key: &str) -> Result<Option<String>> {
        self.get(key).await
    }

    /// Store a value, replacing any previous one
    async fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key
    async fn remove(&self, key: &str) -> Result<()>;

    /// Keys starting with `prefix`, sorted
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Notification that a key changed
#[derive(Debug, Clone, PartialEq)]
pub struct StorageEvent {
    /// The key that changed
    pub key: String,

    /// The new value, `None` when removed
    pub new_value: Option<String>,

    /// Identifies the writer; workspaces use their instance id
    pub origin: String,
}

/// Shared storage for all contexts of a project
pub struct Storage {
    /// Store for values
    kv: Box<dyn KeyValueStore>,

    /// Change bus
    events: broadcast::Sender<StorageEvent>,
}

impl Storage {
    /// Create a new storage instance
    pub async fn new(config: StorageConfig) -> Result<Self> {
        match config {
            StorageConfig::Memory => {
                let storage = SqliteStorage::new(":memory:").await?;
                Ok(Self::with_store(Box::new(storage)))
            }
            StorageConfig::Sqlite { path } => {
                let storage = SqliteStorage::new(&path).await?;
                Ok(Self::with_store(Box::new(storage)))
            }
        }
    }

    /// Wrap any key-value store
    pub fn with_store(kv: Box<dyn KeyValueStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { kv, events }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        self.kv.get(key).await
    }

    /// Read past the cache, seeing writes of other connections
    pub async fn get_fresh(&self, key: &str) -> Result<Option<String>> {
        self.kv.get_fresh(key).await
    }

    /// Write a value and announce it.
    pub async fn set(&self, key: &str, value: &str, origin: &str) -> Result<()> {
        self.kv.put(key, value).await?;
        self.notify(StorageEvent {
            key: key.to_string(),
            new_value: Some(value.to_string()),
            origin: origin.to_string(),
        });
        Ok(())
    }

    /// Remove a key and announce it.
    pub async fn remove(&self, key: &str, origin: &str) -> Result<()> {
        self.kv.remove(key).await?;
        self.notify(StorageEvent {
            key: key.to_string(),
            new_value: None,
            origin: origin.to_string(),
        });
        Ok(())
    }

    pub async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        self.kv.keys(prefix).await
    }

    /// Publish an event without writing anything.
    pub fn notify(&self, event: StorageEvent) {
        trace!(key = %event.key, origin = %event.origin, "storage event");
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    /// Receive every event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }
}
