//! Ordered key-value store trait.
//!
//! The dedup cache needs exactly three primitives from its store: exact-key
//! existence checks, atomic batches of puts and deletes, and ordered range
//! scans over `[start, limit)`. No TTL or secondary index support is assumed.
//!
//! # Available Implementations
//!
//! | Backend | Use Case | Ordering |
//! |---------|----------|----------|
//! | `MemoryStore` | Tests, ephemeral nodes | `BTreeMap` byte order |
//! | `SqliteStore` | Default; embedded | `BLOB` primary key (memcmp) |
//!
//! # Error Modes and Guarantees
//!
//! | Operation | Atomicity | Failure |
//! |-----------|-----------|---------|
//! | `has` | Single read | `Error::OperationFailed` |
//! | `write_batch` | All or nothing | `Error::OperationFailed`, nothing applied |
//! | `scan_range` | Snapshot per call | `Error::OperationFailed` |
//!
//! A missing key is never an error: `has` returns `Ok(false)`.

use crate::Result;
use std::sync::Arc;

/// Trait for ordered key-value stores.
///
/// # Implementor Notes
///
/// - Methods use `&self` to enable sharing via `Arc<dyn KvStore>`
/// - Use interior mutability (e.g., `RwLock`, `Mutex<Connection>`) for mutable state
/// - `scan_range` must visit keys in ascending unsigned byte order
pub trait KvStore: Send + Sync {
    /// Returns a short backend name for logs and metric labels.
    fn backend_name(&self) -> &'static str;

    /// Checks whether a key exists.
    fn has(&self, key: &[u8]) -> Result<bool>;

    /// Applies a batch of writes atomically.
    fn write_batch(&self, batch: WriteBatch) -> Result<()>;

    /// Returns all keys in `[start, limit)`, ascending.
    fn scan_range(&self, start: &[u8], limit: &[u8]) -> Result<Vec<Vec<u8>>>;
}

impl<S: KvStore + ?Sized> KvStore for Arc<S> {
    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }

    fn has(&self, key: &[u8]) -> Result<bool> {
        (**self).has(key)
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        (**self).write_batch(batch)
    }

    fn scan_range(&self, start: &[u8], limit: &[u8]) -> Result<Vec<Vec<u8>>> {
        (**self).scan_range(start, limit)
    }
}

/// A batch of write operations to be applied atomically.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteBatch {
    operations: Vec<BatchOp>,
}

/// A single operation in a write batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOp {
    /// Put a key-value pair.
    Put {
        /// The key to write.
        key: Vec<u8>,
        /// The value to write.
        value: Vec<u8>,
    },
    /// Delete a key.
    Delete {
        /// The key to delete.
        key: Vec<u8>,
    },
}

impl WriteBatch {
    /// Creates an empty batch.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            operations: Vec::new(),
        }
    }

    /// Stages a put.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.operations.push(BatchOp::Put { key, value });
    }

    /// Stages a delete.
    pub fn delete(&mut self, key: Vec<u8>) {
        self.operations.push(BatchOp::Delete { key });
    }

    /// Returns true if nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Returns the number of staged operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns the staged operations in insertion order.
    #[must_use]
    pub fn operations(&self) -> &[BatchOp] {
        &self.operations
    }
}

impl IntoIterator for WriteBatch {
    type Item = BatchOp;
    type IntoIter = std::vec::IntoIter<BatchOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_staging_order() {
        let mut batch = WriteBatch::new();
        assert!(batch.is_empty());

        batch.put(b"a".to_vec(), Vec::new());
        batch.delete(b"b".to_vec());

        assert_eq!(batch.len(), 2);
        assert_eq!(
            batch.operations(),
            &[
                BatchOp::Put {
                    key: b"a".to_vec(),
                    value: Vec::new(),
                },
                BatchOp::Delete { key: b"b".to_vec() },
            ]
        );
    }
}
