//! Storage layer abstraction.
//!
//! The dedup cache is written against the [`KvStore`] trait: exact-key
//! lookups, atomic batches and ordered range scans. Two backends ship:
//! - **Memory**: `BTreeMap` under an `RwLock`, for tests and ephemeral nodes
//! - **`SQLite`**: a single `WITHOUT ROWID` table keyed by `BLOB`

// Allow significant_drop_tightening - releasing the connection lock a few
// statements early provides no meaningful benefit.
#![allow(clippy::significant_drop_tightening)]

pub mod memory;
pub mod metrics;
pub mod sqlite;
pub mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{BatchOp, KvStore, WriteBatch};

use crate::Result;
use crate::config::{FloodgateConfig, StoreKind};
use std::sync::Arc;

/// Opens the store selected by the configuration.
///
/// # Errors
///
/// Returns an error if the `SQLite` database cannot be opened.
pub fn open_store(config: &FloodgateConfig) -> Result<Arc<dyn KvStore>> {
    let store: Arc<dyn KvStore> = match config.store {
        StoreKind::Memory => Arc::new(MemoryStore::new()),
        StoreKind::Sqlite => Arc::new(SqliteStore::open(config.db_path.clone())?),
    };

    tracing::info!(
        backend = store.backend_name(),
        db_path = %config.db_path.display(),
        "Opened dedup store"
    );

    Ok(store)
}
