//! Coalescing writer for rapid edits

use super::ChangeSignaler;
use crate::storage::Storage;
use crate::types::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

enum Command {
    Write { key: String, value: String },
    Flush(oneshot::Sender<Result<()>>),
}

/// Holds back writes until no new one arrived for `delay`
///
/// Later writes to a key replace earlier pending ones. Each flushed batch is
/// followed by one change signal.
pub struct DebouncedWriter {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl DebouncedWriter {
    /// Writes are tagged with `origin`; the batch signal names `source`.
    pub fn spawn(
        storage: Arc<Storage>,
        signaler: Arc<ChangeSignaler>,
        source: String,
        origin: String,
        delay: Duration,
    ) -> Self {
        let batch = Batch {
            storage,
            signaler,
            source,
            origin,
        };
        let (commands, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(batch, delay, rx));
        Self { commands, task }
    }

    /// Queue a write
    pub fn schedule(&self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        self.commands
            .send(Command::Write {
                key: key.into(),
                value: value.into(),
            })
            .map_err(|_| Error::InvalidOperation("debounced writer stopped".into()))
    }

    /// Write everything pending now
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Flush(tx))
            .map_err(|_| Error::InvalidOperation("debounced writer stopped".into()))?;
        rx.await
            .map_err(|_| Error::InvalidOperation("debounced writer stopped".into()))?
    }

    /// Flush and stop the background task
    pub async fn shutdown(self) -> Result<()> {
        let result = self.flush().await;
        drop(self.commands);
        if let Err(err) = self.task.await {
            warn!(error = %err, "debounced writer task failed");
        }
        result
    }
}

struct Batch {
    storage: Arc<Storage>,
    signaler: Arc<ChangeSignaler>,
    source: String,
    origin: String,
}

async fn run(
    batch: Batch,
    delay: Duration,
    mut rx: mpsc::UnboundedReceiver<Command>,
) {
    let mut pending: BTreeMap<String, String> = BTreeMap::new();
    let mut deadline: Option<Instant> = None;

    loop {
        let armed = deadline;
        let timer = async move {
            match armed {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Write { key, value }) => {
                    pending.insert(key, value);
                    deadline = Some(Instant::now() + delay);
                }
                Some(Command::Flush(reply)) => {
                    let result = batch.write(&mut pending).await;
                    deadline = None;
                    let _ = reply.send(result);
                }
                None => {
                    if let Err(err) = batch.write(&mut pending).await {
                        warn!(error = %err, "final debounced flush failed");
                    }
                    break;
                }
            },
            _ = timer => {
                deadline = None;
                if let Err(err) = batch.write(&mut pending).await {
                    warn!(error = %err, "debounced flush failed");
                }
            }
        }
    }
}

impl Batch {
    /// Write out `pending` in key order. On failure the failed entry and
    /// everything after it stay pending.
    async fn write(&self, pending: &mut BTreeMap<String, String>) -> Result<()> {
        if pending.is_empty() {
            return Ok(());
        }
        debug!(keys = pending.len(), "flushing debounced writes");
        while let Some((key, value)) = pending.pop_first() {
            if let Err(err) = self.storage.set(&key, &value, &self.origin).await {
                pending.insert(key, value);
                return Err(err);
            }
        }
        self.signaler.signal(&self.source).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{KeyValueStore, SqliteStorage, StorageConfig};
    use crate::sync::{keys, ManualClock};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    async fn writer(delay: Duration) -> (Arc<Storage>, DebouncedWriter) {
        let storage = Arc::new(Storage::new(StorageConfig::Memory).await.unwrap());
        let clock = Arc::new(ManualClock::new(0));
        let signaler = Arc::new(ChangeSignaler::new(storage.clone(), clock, Duration::from_millis(300)));
        let writer = DebouncedWriter::spawn(storage.clone(), signaler, "metre".into(), "tab".into(), delay);
        (storage, writer)
    }

    #[tokio::test(start_paused = true)]
    async fn writes_land_after_quiet_period() {
        let (storage, writer) = writer(Duration::from_secs(1)).await;

        writer.schedule("metreTreeData_default", "[1]").unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        writer.schedule("metreTreeData_default", "[2]").unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(storage.get("metreTreeData_default").await.unwrap(), None);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(storage.get("metreTreeData_default").await.unwrap().as_deref(), Some("[2]"));
        assert!(storage.get(keys::MODIFICATION_SIGNAL).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn flush_writes_immediately() {
        let (storage, writer) = writer(Duration::from_secs(3600)).await;
        writer.schedule("a", "1").unwrap();
        writer.schedule("b", "2").unwrap();
        writer.flush().await.unwrap();

        assert_eq!(storage.get("a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(storage.get("b").await.unwrap().as_deref(), Some("2"));
        writer.shutdown().await.unwrap();
    }

    /// Refuses writes to "bad" while `failing` is set
    struct FlakyStore {
        inner: SqliteStorage,
        failing: Arc<AtomicBool>,
    }

    #[async_trait]
    impl KeyValueStore for FlakyStore {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key).await
        }

        async fn put(&self, key: &str, value: &str) -> Result<()> {
            if key == "bad" && self.failing.load(Ordering::SeqCst) {
                return Err(Error::InvalidOperation("disk full".into()));
            }
            self.inner.put(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key).await
        }

        async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
            self.inner.keys(prefix).await
        }
    }

    #[tokio::test]
    async fn failed_write_keeps_rest_pending() {
        let failing = Arc::new(AtomicBool::new(true));
        let store = FlakyStore {
            inner: SqliteStorage::new(":memory:").await.unwrap(),
            failing: failing.clone(),
        };
        let storage = Arc::new(Storage::with_store(Box::new(store)));
        let clock = Arc::new(ManualClock::new(0));
        let signaler = Arc::new(ChangeSignaler::new(storage.clone(), clock, Duration::from_millis(300)));
        let writer = DebouncedWriter::spawn(storage.clone(), signaler, "metre".into(), "tab".into(), Duration::from_secs(3600));

        writer.schedule("a", "1").unwrap();
        writer.schedule("bad", "2").unwrap();
        writer.schedule("c", "3").unwrap();
        assert!(writer.flush().await.is_err());
        assert_eq!(storage.get("a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(storage.get("c").await.unwrap(), None);
        assert!(storage.get(keys::MODIFICATION_SIGNAL).await.unwrap().is_none());

        failing.store(false, Ordering::SeqCst);
        writer.flush().await.unwrap();
        assert_eq!(storage.get("bad").await.unwrap().as_deref(), Some("2"));
        assert_eq!(storage.get("c").await.unwrap().as_deref(), Some("3"));
        assert!(storage.get(keys::MODIFICATION_SIGNAL).await.unwrap().is_some());
        writer.shutdown().await.unwrap();
    }
}
