//! # Floodgate
//!
//! Date-bucketed deduplication cache for flood-delivered pub/sub messages.
//!
//! Gossip networks deliver the same message many times. Floodgate answers
//! "has this subscription already seen this exact message in the last two
//! days?" using nothing but an ordered key-value store: exact-key lookups for
//! membership and ordered range deletion for expiry.
//!
//! ## Features
//!
//! - Content-addressed identity (SHA3-512 over payload and topic)
//! - Rolling two-day window recomputed from an injected clock
//! - Bulk expiry that piggybacks on writes, with no background timers
//! - Pluggable stores (in-memory `BTreeMap`, `SQLite`)
//!
//! ## Example
//!
//! ```rust
//! use floodgate::services::deduplication::{DedupCache, DeduplicationService, Deduplicator};
//! use floodgate::storage::MemoryStore;
//! use floodgate::{Message, Topic};
//!
//! let service = DeduplicationService::new(DedupCache::new(MemoryStore::new()));
//! let batch = vec![Message::new(b"ping".to_vec(), Topic::new([1, 2, 3, 4]))];
//!
//! let first = service.deduplicate("filterA", batch.clone());
//! assert_eq!(first.new_messages.len(), 1);
//!
//! let second = service.deduplicate("filterA", batch);
//! assert!(second.new_messages.is_empty());
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod config;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

pub use config::FloodgateConfig;
pub use models::{ContentDigest, Message, Topic};
pub use services::deduplication::{
    Clock, DedupCache, DeduplicationOutcome, DeduplicationService, Deduplicator, ManualClock,
    SystemClock,
};
pub use storage::{KvStore, MemoryStore, SqliteStore, WriteBatch};

/// Error type for floodgate operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Malformed topic hex, unreadable message lines, bad config values |
/// | `OperationFailed` | Store reads or batch writes fail, config files cannot be read |
/// | `ExpiryFailed` | A `put` batch committed but the stale-bucket sweep failed |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - The store cannot answer a membership query
    /// - A write batch is rejected or fails to commit
    /// - `SQLite` cannot be opened or its schema created
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// New entries were written but the stale-bucket sweep failed.
    ///
    /// The `written` keys are durable. Stale buckets linger until the next
    /// successful sweep, which never affects membership answers.
    #[error("recorded {written} entries but bucket expiry failed: {cause}")]
    ExpiryFailed {
        /// Number of entries committed before the sweep ran.
        written: usize,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Returns true if the caller's write reached the store despite the error.
    #[must_use]
    pub const fn write_landed(&self) -> bool {
        matches!(self, Self::ExpiryFailed { .. })
    }
}

/// Result type alias for floodgate operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("test error".to_string());
        assert_eq!(err.to_string(), "invalid input: test error");

        let err = Error::OperationFailed {
            operation: "test".to_string(),
            cause: "failed".to_string(),
        };
        assert_eq!(err.to_string(), "operation 'test' failed: failed");

        let err = Error::ExpiryFailed {
            written: 3,
            cause: "disk full".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "recorded 3 entries but bucket expiry failed: disk full"
        );
    }

    #[test]
    fn test_write_landed() {
        assert!(
            Error::ExpiryFailed {
                written: 1,
                cause: String::new(),
            }
            .write_landed()
        );
        assert!(
            !Error::OperationFailed {
                operation: "write_batch".to_string(),
                cause: String::new(),
            }
            .write_landed()
        );
    }
}
