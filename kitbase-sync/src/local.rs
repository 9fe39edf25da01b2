//! Device-scoped local key-value stores.
//!
//! Values are stored as JSON-serialized strings, mirroring browser
//! `localStorage`. All operations are synchronous.

use crate::error::{SyncError, SyncResult};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Synchronous string key-value store persisted on the device.
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> SyncResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> SyncResult<()>;

    fn remove(&self, key: &str) -> SyncResult<()>;

    /// Returns every stored key, in ascending order.
    fn keys(&self) -> SyncResult<Vec<String>>;
}

// ── MemoryLocalStore ────────────────────────────────────────────

/// Process-lifetime local store. Clones share the same map, so a clone
/// handed to a second engine behaves like the same device after a restart.
#[derive(Clone, Default)]
pub struct MemoryLocalStore {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> SyncResult<MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| SyncError::Local("memory store lock poisoned".to_string()))
    }
}

impl LocalStore for MemoryLocalStore {
    fn get(&self, key: &str) -> SyncResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> SyncResult<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> SyncResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn keys(&self) -> SyncResult<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }
}

// ── SqliteLocalStore ────────────────────────────────────────────

/// Durable local store backed by a single SQLite table.
#[derive(Clone)]
pub struct SqliteLocalStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLocalStore {
    /// Opens or creates the store at `path`, creating parent directories.
    pub fn open(path: &Path) -> SyncResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> SyncResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> SyncResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SyncError::Local("sqlite connection lock poisoned".to_string()))
    }
}

fn initialize_schema(conn: &Connection) -> SyncResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS kv (
            key TEXT PRIMARY KEY NOT NULL,
            value TEXT NOT NULL
        );",
    )?;
    Ok(())
}

impl LocalStore for SqliteLocalStore {
    fn get(&self, key: &str) -> SyncResult<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> SyncResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> SyncResult<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn keys(&self) -> SyncResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT key FROM kv ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }
}
