//! In-memory key-value store.

use crate::Result;
use crate::storage::metrics::record_result;
use crate::storage::traits::{BatchOp, KvStore, WriteBatch};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

const BACKEND: &str = "memory";

/// In-memory store backed by a `BTreeMap`.
///
/// Keys are kept in byte order, so range scans are a direct `BTreeMap::range`.
/// Readers share the lock; a batch holds the write lock for its whole
/// application, which makes it atomic with respect to every other caller.
///
/// # Lock Poisoning
///
/// A poisoned lock is recovered rather than surfaced. Batches are applied to
/// the map only after they are fully staged, so a panic elsewhere cannot
/// leave a half-applied batch behind.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns true if the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Returns every stored key in order.
    #[must_use]
    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.read().keys().cloned().collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>> {
        self.data.read().unwrap_or_else(|poisoned| {
            tracing::warn!("memory store lock was poisoned, recovering");
            metrics::counter!("memory_store_poison_recovery_total").increment(1);
            PoisonError::into_inner(poisoned)
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>> {
        self.data.write().unwrap_or_else(|poisoned| {
            tracing::warn!("memory store lock was poisoned, recovering");
            metrics::counter!("memory_store_poison_recovery_total").increment(1);
            PoisonError::into_inner(poisoned)
        })
    }
}

impl KvStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn has(&self, key: &[u8]) -> Result<bool> {
        let start = Instant::now();
        let result = Ok(self.read().contains_key(key));
        record_result(BACKEND, "has", start, &result);
        result
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        let start = Instant::now();
        {
            let mut data = self.write();
            for op in batch {
                match op {
                    BatchOp::Put { key, value } => {
                        data.insert(key, value);
                    },
                    BatchOp::Delete { key } => {
                        data.remove(&key);
                    },
                }
            }
        }
        let result = Ok(());
        record_result(BACKEND, "write_batch", start, &result);
        result
    }

    fn scan_range(&self, start_key: &[u8], limit: &[u8]) -> Result<Vec<Vec<u8>>> {
        let start = Instant::now();
        let keys = if start_key < limit {
            self.read()
                .range::<[u8], _>((
                    std::ops::Bound::Included(start_key),
                    std::ops::Bound::Excluded(limit),
                ))
                .map(|(k, _)| k.clone())
                .collect()
        } else {
            Vec::new()
        };
        let result = Ok(keys);
        record_result(BACKEND, "scan_range", start, &result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put_all(store: &MemoryStore, keys: &[&[u8]]) {
        let mut batch = WriteBatch::new();
        for key in keys {
            batch.put(key.to_vec(), Vec::new());
        }
        store.write_batch(batch).unwrap();
    }

    #[test]
    fn test_has_and_batch() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        assert!(!store.has(b"k1").unwrap());

        put_all(&store, &[b"k1", b"k2"]);
        assert!(store.has(b"k1").unwrap());
        assert_eq!(store.len(), 2);

        let mut batch = WriteBatch::new();
        batch.delete(b"k1".to_vec());
        batch.put(b"k3".to_vec(), Vec::new());
        store.write_batch(batch).unwrap();

        assert!(!store.has(b"k1").unwrap());
        assert!(store.has(b"k3").unwrap());
    }

    #[test]
    fn test_scan_range_is_half_open_and_ordered() {
        let store = MemoryStore::new();
        put_all(&store, &[b"c", b"a", b"b", b"d"]);

        let keys = store.scan_range(b"a", b"c").unwrap();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn test_scan_range_empty_when_start_not_below_limit() {
        let store = MemoryStore::new();
        put_all(&store, &[b"a", b"b"]);

        assert!(store.scan_range(b"b", b"b").unwrap().is_empty());
        assert!(store.scan_range(b"c", b"a").unwrap().is_empty());
    }

    #[test]
    fn test_keys_sorted() {
        let store = MemoryStore::new();
        put_all(&store, &[b"z", b"m", b"a"]);
        assert_eq!(store.keys(), vec![b"a".to_vec(), b"m".to_vec(), b"z".to_vec()]);
    }
}
