//! SQLite storage implementation for metre

use crate::types::{Result, StorageError};
use async_trait::async_trait;
use lru::LruCache;
use rusqlite::{params, Connection, OptionalExtension};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;

/// Number of recently read values kept in memory
const DEFAULT_CACHE_SIZE: usize = 1_024;

/// SQLite storage implementation for metre
#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<TokioMutex<Connection>>,

    /// Read cache; always locked before `conn`
    cache: Arc<TokioMutex<LruCache<String, String>>>,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path).map_err(StorageError::Sqlite)?;

        // Create tables if they don't exist
        Self::init_schema(&conn)?;

        let capacity = NonZeroUsize::new(DEFAULT_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            conn: Arc::new(TokioMutex::new(conn)),
            cache: Arc::new(TokioMutex::new(LruCache::new(capacity))),
        })
    }

    /// Initialize the database schema
    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS metre_kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )
        .map_err(StorageError::Sqlite)?;

        Ok(())
    }

    fn read_row(conn: &Connection, key: &str) -> Result<Option<String>> {
        let value = conn
            .query_row("SELECT value FROM metre_kv WHERE key = ?", [key], |row| row.get(0))
            .optional()
            .map_err(StorageError::Sqlite)?;
        Ok(value)
    }
}

#[async_trait]
impl super::KeyValueStore for SqliteStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut cache = self.cache.lock().await;
        if let Some(value) = cache.get(key) {
            return Ok(Some(value.clone()));
        }

        let conn = self.conn.lock().await;
        let value = Self::read_row(&conn, key)?;

        if let Some(value) = &value {
            cache.put(key.to_string(), value.clone());
        }

        Ok(value)
    }

    async fn get_fresh(&self, key: &str) -> Result<Option<String>> {
        let mut cache = self.cache.lock().await;
        let conn = self.conn.lock().await;
        let value = Self::read_row(&conn, key)?;

        match &value {
            Some(value) => {
                cache.put(key.to_string(), value.clone());
            }
            None => {
                cache.pop(key);
            }
        }

        Ok(value)
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut cache = self.cache.lock().await;
        let conn = self.conn.lock().await;

        conn.execute(
            "INSERT OR REPLACE INTO metre_kv (key, value, updated_at) VALUES (?, ?, ?)",
            params![key, value, chrono::Utc::now().timestamp_millis()],
        )
        .map_err(StorageError::Sqlite)?;

        cache.put(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut cache = self.cache.lock().await;
        let conn = self.conn.lock().await;

        conn.execute("DELETE FROM metre_kv WHERE key = ?", [key])
            .map_err(StorageError::Sqlite)?;

        cache.pop(key);
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;

        let mut stmt = conn
            .prepare("SELECT key FROM metre_kv WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key")
            .map_err(StorageError::Sqlite)?;

        let rows = stmt
            .query_map([prefix], |row| row.get::<_, String>(0))
            .map_err(StorageError::Sqlite)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row.map_err(StorageError::Sqlite)?);
        }

        Ok(result)
    }
}
