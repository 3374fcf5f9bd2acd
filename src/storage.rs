//! Durable local key-value storage.
//!
//! Preferences and the cross-view handoff record are small JSON documents
//! stored under fixed keys. `SqliteKvStore` persists them to disk,
//! `InMemoryKvStore` backs tests and throwaway sessions.

use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    fn remove(&mut self, key: &str) -> Result<()>;
}

/// Store handle shared by the preference store and the handoff writer.
pub type SharedStore = Arc<Mutex<dyn KeyValueStore + Send>>;

pub fn shared<S: KeyValueStore + Send + 'static>(store: S) -> SharedStore {
    Arc::new(Mutex::new(store))
}

pub(crate) fn read_key(store: &SharedStore, key: &str) -> Result<Option<String>> {
    let guard = store
        .lock()
        .map_err(|_| anyhow!("key-value store lock poisoned"))?;
    guard.get(key)
}

pub(crate) fn write_key(store: &SharedStore, key: &str, value: &str) -> Result<()> {
    let mut guard = store
        .lock()
        .map_err(|_| anyhow!("key-value store lock poisoned"))?;
    guard.set(key, value)
}

pub(crate) fn remove_key(store: &SharedStore, key: &str) -> Result<()> {
    let mut guard = store
        .lock()
        .map_err(|_| anyhow!("key-value store lock poisoned"))?;
    guard.remove(key)
}

pub struct SqliteKvStore {
    conn: Connection,
}

impl SqliteKvStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .map_err(|e| anyhow!("failed to open store {}: {}", db_path, e))?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let mut store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS kv (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL,
              updated_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }
}

impl KeyValueStore for SqliteKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, chrono::Utc::now().timestamp()],
        )?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryKvStore {
    entries: HashMap<String, String>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for InMemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_store_overwrites_and_removes() {
        let mut store = SqliteKvStore::open_in_memory().unwrap();
        assert_eq!(store.get("k").unwrap(), None);

        store.set("k", "one").unwrap();
        store.set("k", "two").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("two"));

        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn sqlite_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("panel.db");
        let path = path.to_str().unwrap();

        {
            let mut store = SqliteKvStore::open(path).unwrap();
            store.set("detection-preferences", "{}").unwrap();
        }
        let store = SqliteKvStore::open(path).unwrap();
        assert_eq!(
            store.get("detection-preferences").unwrap().as_deref(),
            Some("{}")
        );
    }

    #[test]
    fn shared_handle_reads_writes() {
        let store = shared(InMemoryKvStore::new());
        write_key(&store, "a", "1").unwrap();
        assert_eq!(read_key(&store, "a").unwrap().as_deref(), Some("1"));
        remove_key(&store, "a").unwrap();
        assert_eq!(read_key(&store, "a").unwrap(), None);
    }
}
