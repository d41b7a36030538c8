//! `SQLite`-backed key-value store.

use super::connection::{acquire_lock, configure_connection};
use crate::storage::metrics::record_result;
use crate::storage::traits::{BatchOp, KvStore, WriteBatch};
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tracing::instrument;

const BACKEND: &str = "sqlite";

/// Durable key-value store on a single `SQLite` table.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE kv (key BLOB PRIMARY KEY, value BLOB NOT NULL) WITHOUT ROWID
/// ```
///
/// `BLOB` keys compare with `memcmp`, so `ORDER BY key` is unsigned byte
/// order and range scans use the primary key index directly.
///
/// # Concurrency Model
///
/// `rusqlite::Connection` is not `Sync`, so it sits behind a `Mutex`. Each
/// batch runs inside one transaction and is committed or rolled back as a
/// unit.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SqliteStore {
    /// Opens (or creates) a store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
                operation: "create_db_dir".to_string(),
                cause: format!("{}: {e}", parent.display()),
            })?;
        }

        let conn = Connection::open(&db_path).map_err(|e| Error::OperationFailed {
            operation: "open_sqlite".to_string(),
            cause: e.to_string(),
        })?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Creates an in-memory store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::OperationFailed {
            operation: "open_sqlite_in_memory".to_string(),
            cause: e.to_string(),
        })?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    /// Returns the database path (None for in-memory).
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        configure_connection(&conn)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key BLOB PRIMARY KEY,
                value BLOB NOT NULL
            ) WITHOUT ROWID",
            [],
        )
        .map_err(|e| Error::OperationFailed {
            operation: "create_kv_table".to_string(),
            cause: e.to_string(),
        })?;

        Ok(())
    }

    fn apply_batch(conn: &mut Connection, batch: WriteBatch) -> rusqlite::Result<()> {
        let tx = conn.transaction()?;
        {
            let mut put = tx.prepare_cached("INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)")?;
            let mut delete = tx.prepare_cached("DELETE FROM kv WHERE key = ?1")?;
            for op in batch {
                match op {
                    BatchOp::Put { key, value } => {
                        put.execute(params![key, value])?;
                    },
                    BatchOp::Delete { key } => {
                        delete.execute(params![key])?;
                    },
                }
            }
        }
        tx.commit()
    }
}

impl KvStore for SqliteStore {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn has(&self, key: &[u8]) -> Result<bool> {
        let start = Instant::now();
        let result = {
            let conn = acquire_lock(&self.conn);
            conn.prepare_cached("SELECT 1 FROM kv WHERE key = ?1")
                .and_then(|mut stmt| stmt.query_row(params![key], |_| Ok(())).optional())
                .map(|found| found.is_some())
                .map_err(|e| Error::OperationFailed {
                    operation: "sqlite_has".to_string(),
                    cause: e.to_string(),
                })
        };
        record_result(BACKEND, "has", start, &result);
        result
    }

    #[instrument(skip(self, batch), fields(operations = batch.len()))]
    fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let start = Instant::now();
        let result = {
            let mut conn = acquire_lock(&self.conn);
            Self::apply_batch(&mut conn, batch).map_err(|e| Error::OperationFailed {
                operation: "sqlite_write_batch".to_string(),
                cause: e.to_string(),
            })
        };
        record_result(BACKEND, "write_batch", start, &result);
        result
    }

    fn scan_range(&self, start_key: &[u8], limit: &[u8]) -> Result<Vec<Vec<u8>>> {
        let start = Instant::now();
        let result = {
            let conn = acquire_lock(&self.conn);
            conn.prepare_cached("SELECT key FROM kv WHERE key >= ?1 AND key < ?2 ORDER BY key")
                .and_then(|mut stmt| {
                    let rows =
                        stmt.query_map(params![start_key, limit], |row| row.get::<_, Vec<u8>>(0))?;
                    rows.collect::<rusqlite::Result<Vec<_>>>()
                })
                .map_err(|e| Error::OperationFailed {
                    operation: "sqlite_scan_range".to_string(),
                    cause: e.to_string(),
                })
        };
        record_result(BACKEND, "scan_range", start, &result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn put_all(store: &SqliteStore, keys: &[&[u8]]) {
        let mut batch = WriteBatch::new();
        for key in keys {
            batch.put(key.to_vec(), Vec::new());
        }
        store.write_batch(batch).unwrap();
    }

    #[test]
    fn test_in_memory_has_and_batch() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.db_path().is_none());
        assert!(!store.has(b"k1").unwrap());

        put_all(&store, &[b"k1", b"k2"]);
        assert!(store.has(b"k1").unwrap());
        assert!(store.has(b"k2").unwrap());

        let mut batch = WriteBatch::new();
        batch.delete(b"k1".to_vec());
        store.write_batch(batch).unwrap();
        assert!(!store.has(b"k1").unwrap());
    }

    #[test]
    fn test_scan_range_uses_byte_order() {
        let store = SqliteStore::in_memory().unwrap();
        // 0xff sorts after ASCII under memcmp
        let high: &[u8] = &[0x44, 0x44, 0x2d, 0xff];
        put_all(&store, &[b"DD-2", high, b"DD-1", b"DE"]);

        let keys = store.scan_range(b"DD-", b"DD.").unwrap();
        assert_eq!(
            keys,
            vec![b"DD-1".to_vec(), b"DD-2".to_vec(), vec![0x44, 0x44, 0x2d, 0xff]]
        );
    }

    #[test]
    fn test_put_is_idempotent() {
        let store = SqliteStore::in_memory().unwrap();
        put_all(&store, &[b"same", b"same"]);
        assert_eq!(store.scan_range(b"a", b"z").unwrap().len(), 1);
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let store = SqliteStore::in_memory().unwrap();
        store.write_batch(WriteBatch::new()).unwrap();
    }

    #[test]
    fn test_file_store_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("dedup.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            put_all(&store, &[b"persisted"]);
        }

        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.db_path(), Some(path.as_path()));
        assert!(reopened.has(b"persisted").unwrap());
    }
}
