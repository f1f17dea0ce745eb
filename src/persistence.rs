//! Key-value persistence layer for Starchain
//!
//! The ledger and the identity store each own one namespace. Both are backed
//! by the same [`KeyValueStore`] abstraction so the core never sees SQL.

use crate::error::{ChainError, Result};
use parking_lot::RwLock;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Namespace holding serialized blocks keyed by decimal height.
pub const BLOCKS_NAMESPACE: &str = "blocks";
/// Namespace holding identity challenges keyed by address.
pub const IDENTITY_NAMESPACE: &str = "identity";

/// Ordered byte store. Implementations must return `scan` results in ascending key order.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;
    /// Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<()>;
    fn scan(&self) -> Result<Vec<(String, Vec<u8>)>>;
}

/// SQLite-backed store. Each handle is bound to one namespace of a shared `kv` table.
pub struct Database {
    conn: Mutex<Connection>,
    namespace: String,
}

impl Database {
    pub fn open(path: &str, namespace: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| ChainError::Storage(format!("Failed to open database: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                value BLOB NOT NULL,
                PRIMARY KEY (namespace, key)
            )",
            [],
        )
        .map_err(|e| ChainError::Storage(format!("Failed to create kv table: {}", e)))?;

        Ok(Database {
            conn: Mutex::new(conn),
            namespace: namespace.to_string(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ChainError::Storage("Mutex poisoned".to_string()))
    }
}

impl KeyValueStore for Database {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT value FROM kv WHERE namespace = ?1 AND key = ?2",
            params![self.namespace, key],
            |row| row.get::<_, Vec<u8>>(0),
        )
        .optional()
        .map_err(|e| ChainError::Storage(format!("Failed to read key {}: {}", key, e)))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO kv (namespace, key, value) VALUES (?1, ?2, ?3)",
            params![self.namespace, key, value],
        )
        .map_err(|e| ChainError::Storage(format!("Failed to write key {}: {}", key, e)))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM kv WHERE namespace = ?1 AND key = ?2",
            params![self.namespace, key],
        )
        .map_err(|e| ChainError::Storage(format!("Failed to delete key {}: {}", key, e)))?;
        Ok(())
    }

    fn scan(&self) -> Result<Vec<(String, Vec<u8>)>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT key, value FROM kv WHERE namespace = ?1 ORDER BY key ASC")
            .map_err(|e| ChainError::Storage(format!("Failed to prepare scan: {}", e)))?;

        let rows = stmt
            .query_map(params![self.namespace], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })
            .map_err(|e| ChainError::Storage(format!("Failed to scan {}: {}", self.namespace, e)))?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(|e| ChainError::Storage(format!("Failed to read row: {}", e)))?);
        }
        Ok(entries)
    }
}

/// Simple in-memory store useful for tests and ephemeral runs.
/// Clones share the same underlying map.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn scan(&self) -> Result<Vec<(String, Vec<u8>)>> {
        Ok(self
            .entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_database_open() {
        let db = Database::open(":memory:", BLOCKS_NAMESPACE).unwrap();
        assert!(db.conn.lock().unwrap().is_autocommit());
        assert_eq!(db.namespace(), BLOCKS_NAMESPACE);
    }

    #[test]
    fn test_database_put_get_delete() {
        let db = Database::open(":memory:", IDENTITY_NAMESPACE).unwrap();
        assert_eq!(db.get("alice").unwrap(), None);

        db.put("alice", b"first").unwrap();
        db.put("alice", b"second").unwrap();
        assert_eq!(db.get("alice").unwrap(), Some(b"second".to_vec()));

        db.delete("alice").unwrap();
        assert_eq!(db.get("alice").unwrap(), None);
        // Deleting again is fine
        db.delete("alice").unwrap();
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chain.db");
        let path = path.to_str().unwrap();

        let blocks = Database::open(path, BLOCKS_NAMESPACE).unwrap();
        let identity = Database::open(path, IDENTITY_NAMESPACE).unwrap();

        blocks.put("0", b"genesis").unwrap();
        identity.put("0", b"challenge").unwrap();

        assert_eq!(blocks.get("0").unwrap(), Some(b"genesis".to_vec()));
        assert_eq!(identity.get("0").unwrap(), Some(b"challenge".to_vec()));
        assert_eq!(blocks.scan().unwrap().len(), 1);
    }

    #[test]
    fn test_database_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chain.db");
        let path = path.to_str().unwrap();

        {
            let db = Database::open(path, BLOCKS_NAMESPACE).unwrap();
            db.put("1", b"one").unwrap();
        }

        let db = Database::open(path, BLOCKS_NAMESPACE).unwrap();
        assert_eq!(db.get("1").unwrap(), Some(b"one".to_vec()));
    }

    #[test]
    fn test_scan_is_key_ordered() {
        let db = Database::open(":memory:", BLOCKS_NAMESPACE).unwrap();
        let mem = InMemoryStore::new();
        for key in ["b", "c", "a"] {
            db.put(key, key.as_bytes()).unwrap();
            mem.put(key, key.as_bytes()).unwrap();
        }

        let db_keys: Vec<String> = db.scan().unwrap().into_iter().map(|(k, _)| k).collect();
        let mem_keys: Vec<String> = mem.scan().unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(db_keys, vec!["a", "b", "c"]);
        assert_eq!(mem_keys, db_keys);
    }

    #[test]
    fn test_in_memory_clones_share_entries() {
        let store = InMemoryStore::new();
        let handle = store.clone();
        handle.put("k", b"v").unwrap();
        assert_eq!(store.len(), 1);
        assert!(!store.is_empty());
    }
}
