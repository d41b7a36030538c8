//! Date-bucketed message deduplication.
//!
//! Answers "has this filter already delivered this exact message within the
//! last two days?" on top of any ordered key-value store:
//!
//! 1. **Identity**: SHA3-512 over payload and topic ([`ContentHasher`])
//! 2. **Membership**: exact-key lookups in today's then yesterday's bucket
//! 3. **Expiry**: one ordered range scan and batched delete per write
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ FilterMessages                                                │
//! │  ┌──────────────┐   ┌───────────────────────────────────────┐ │
//! │  │ MessageSource│──▶│ DeduplicationService                  │ │
//! │  └──────────────┘   │  ┌─────────────────────────────────┐  │ │
//! │                     │  │ DedupCache                      │  │ │
//! │                     │  │  has ─▶ DD-<today>-f‖digest     │  │ │
//! │                     │  │      ─▶ DD-<yesterday>-f‖digest │  │ │
//! │                     │  │  put ─▶ batch + expiry sweep    │  │ │
//! │                     │  └───────────────┬─────────────────┘  │ │
//! │                     └──────────────────┼────────────────────┘ │
//! └────────────────────────────────────────┼──────────────────────┘
//!                                          ▼
//!                                 KvStore (memory, SQLite)
//! ```
//!
//! The window is recomputed from the injected [`Clock`] on every call, so
//! there are no background timers.
//!
//! # Example
//!
//! ```rust
//! use floodgate::services::deduplication::{DedupCache, DeduplicationService, Deduplicator};
//! use floodgate::{MemoryStore, Message, Topic};
//!
//! let service = DeduplicationService::new(DedupCache::new(MemoryStore::new()));
//! let msg = Message::new(b"hello".to_vec(), Topic::new([0xde, 0xad, 0xbe, 0xef]));
//!
//! assert_eq!(service.deduplicate("inbox", vec![msg.clone()]).new_messages.len(), 1);
//! assert_eq!(service.deduplicate("inbox", vec![msg]).duplicates, 1);
//! ```

mod cache;
mod clock;
mod hasher;
pub mod keys;
mod service;
mod source;
mod types;

pub use cache::{DedupCache, RETENTION_BUCKETS};
pub use clock::{Clock, ManualClock, SystemClock};
pub use hasher::ContentHasher;
pub use keys::BucketKey;
pub use service::DeduplicationService;
pub use source::{FilterMessages, JsonLinesSource, MemorySource, MessageSource, read_records};
pub use types::{DeduplicationOutcome, Deduplicator, MessageStatus, PutReport};
