//! Deduplication service.
//!
//! Adapts the cache to the "filter a fetched batch" use case: classify each
//! message, deliver the unseen ones in order, record them in one batch.
//!
//! Duplicates are dropped silently; redelivery is normal in a flood network.
//! Store failures fail open: a message whose lookup errored is delivered,
//! since an occasional duplicate is tolerable and a dropped message is not.

use super::cache::DedupCache;
use super::clock::{Clock, SystemClock};
use super::hasher::ContentHasher;
use super::types::{DeduplicationOutcome, Deduplicator, MessageStatus};
use crate::models::Message;
use crate::storage::KvStore;
use std::time::Instant;
use tracing::instrument;

/// Service for deduplicating message batches per filter.
///
/// # Example
///
/// ```rust
/// use floodgate::services::deduplication::{DedupCache, DeduplicationService, Deduplicator};
/// use floodgate::{MemoryStore, Message, Topic};
///
/// let service = DeduplicationService::new(DedupCache::new(MemoryStore::new()));
/// let msgs = vec![
///     Message::new(b"a".to_vec(), Topic::new([0, 0, 0, 1])),
///     Message::new(b"b".to_vec(), Topic::new([0, 0, 0, 1])),
/// ];
///
/// let first = service.deduplicate("room", msgs.clone());
/// assert_eq!(first.new_messages, msgs);
///
/// let second = service.deduplicate("room", msgs);
/// assert!(second.new_messages.is_empty());
/// assert_eq!(second.duplicates, 2);
/// ```
pub struct DeduplicationService<S: KvStore, C: Clock = SystemClock> {
    cache: DedupCache<S, C>,
}

impl<S: KvStore, C: Clock> DeduplicationService<S, C> {
    /// Creates a service over the given cache.
    #[must_use]
    pub const fn new(cache: DedupCache<S, C>) -> Self {
        Self { cache }
    }

    /// Returns the underlying cache.
    #[must_use]
    pub const fn cache(&self) -> &DedupCache<S, C> {
        &self.cache
    }

    /// Classifies one message against the cache.
    fn classify(&self, filter_id: &str, message: &Message) -> MessageStatus {
        let digest = ContentHasher::digest(message);
        match self.cache.has_digest(filter_id, &digest) {
            Ok(true) => MessageStatus::Duplicate,
            Ok(false) => MessageStatus::New,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    filter_id,
                    digest = %digest.short(),
                    "Dedup lookup failed, delivering message"
                );
                MessageStatus::CheckFailed
            },
        }
    }
}

impl<S: KvStore, C: Clock> Deduplicator for DeduplicationService<S, C> {
    #[instrument(
        skip(self, messages),
        fields(operation = "deduplicate", message_count = messages.len())
    )]
    #[allow(clippy::cast_possible_truncation)]
    fn deduplicate(&self, filter_id: &str, messages: Vec<Message>) -> DeduplicationOutcome {
        let start = Instant::now();
        let mut outcome = DeduplicationOutcome::default();

        for message in messages {
            let status = self.classify(filter_id, &message);
            metrics::counter!(
                "dedup_messages_total",
                "outcome" => status.as_str()
            )
            .increment(1);

            match status {
                MessageStatus::Duplicate => outcome.duplicates += 1,
                MessageStatus::CheckFailed => {
                    outcome.check_failures += 1;
                    outcome.new_messages.push(message);
                },
                MessageStatus::New => outcome.new_messages.push(message),
            }
        }

        if let Err(e) = self.cache.put(filter_id, &outcome.new_messages) {
            if e.write_landed() {
                tracing::warn!(error = %e, "Recorded new messages but housekeeping failed");
            } else {
                tracing::error!(
                    error = %e,
                    undelivered_records = outcome.new_messages.len(),
                    "Failed to record new messages; they may be delivered again"
                );
            }
            metrics::counter!("dedup_record_failures_total").increment(1);
            outcome.record_error = Some(e);
        }

        outcome.duration_ms = start.elapsed().as_millis() as u64;
        metrics::histogram!("dedup_pass_duration_ms").record(start.elapsed().as_secs_f64() * 1000.0);

        tracing::debug!(
            new = outcome.new_messages.len(),
            duplicates = outcome.duplicates,
            check_failures = outcome.check_failures,
            duration_ms = outcome.duration_ms,
            "Deduplication pass complete"
        );

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Topic;
    use crate::services::deduplication::ManualClock;
    use crate::storage::{MemoryStore, WriteBatch};
    use crate::{Error, Result};
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Store wrapper with switchable failures.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_has: AtomicBool,
        fail_writes: AtomicBool,
        fail_scans: AtomicBool,
    }

    fn injected(operation: &str) -> Error {
        Error::OperationFailed {
            operation: operation.to_string(),
            cause: "injected".to_string(),
        }
    }

    impl KvStore for FlakyStore {
        fn backend_name(&self) -> &'static str {
            "flaky"
        }

        fn has(&self, key: &[u8]) -> Result<bool> {
            if self.fail_has.load(Ordering::SeqCst) {
                return Err(injected("has"));
            }
            self.inner.has(key)
        }

        fn write_batch(&self, batch: WriteBatch) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(injected("write_batch"));
            }
            self.inner.write_batch(batch)
        }

        fn scan_range(&self, start: &[u8], limit: &[u8]) -> Result<Vec<Vec<u8>>> {
            if self.fail_scans.load(Ordering::SeqCst) {
                return Err(injected("scan_range"));
            }
            self.inner.scan_range(start, limit)
        }
    }

    fn msg(payload: &str) -> Message {
        Message::new(payload.as_bytes().to_vec(), Topic::new([1, 2, 3, 4]))
    }

    fn service() -> DeduplicationService<FlakyStore, ManualClock> {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2018, 4, 25, 10, 0, 0).unwrap());
        DeduplicationService::new(DedupCache::with_clock(FlakyStore::default(), clock))
    }

    #[test]
    fn test_second_pass_is_empty() {
        let service = service();
        let batch = vec![msg("a"), msg("b"), msg("c")];

        let first = service.deduplicate("f", batch.clone());
        assert_eq!(first.new_messages, batch);
        assert!(first.record_error.is_none());

        let second = service.deduplicate("f", batch);
        assert!(second.new_messages.is_empty());
        assert_eq!(second.duplicates, 3);
    }

    #[test]
    fn test_preserves_order_of_new_subset() {
        let service = service();
        service.deduplicate("f", vec![msg("b"), msg("d")]);

        let outcome = service.deduplicate("f", vec![msg("a"), msg("b"), msg("c"), msg("d"), msg("e")]);
        assert_eq!(outcome.new_messages, vec![msg("a"), msg("c"), msg("e")]);
        assert_eq!(outcome.duplicates, 2);
    }

    #[test]
    fn test_repeats_within_one_batch_are_all_reported() {
        let service = service();
        let outcome = service.deduplicate("f", vec![msg("a"), msg("a")]);
        assert_eq!(outcome.new_messages.len(), 2);
        assert_eq!(service.cache().bucket_counts().unwrap().get("20180425"), Some(&1));
    }

    #[test]
    fn test_filters_are_independent() {
        let service = service();
        service.deduplicate("f1", vec![msg("a")]);
        let outcome = service.deduplicate("f2", vec![msg("a")]);
        assert_eq!(outcome.new_messages, vec![msg("a")]);
    }

    #[test]
    fn test_lookup_failure_fails_open() {
        let service = service();
        service.deduplicate("f", vec![msg("a")]);

        service.cache().store().fail_has.store(true, Ordering::SeqCst);
        let outcome = service.deduplicate("f", vec![msg("a"), msg("b")]);

        assert_eq!(outcome.new_messages, vec![msg("a"), msg("b")]);
        assert_eq!(outcome.check_failures, 2);
        assert_eq!(outcome.duplicates, 0);
        assert!(outcome.record_error.is_none());
    }

    #[test]
    fn test_record_failure_is_surfaced_with_messages() {
        let service = service();
        service.cache().store().fail_writes.store(true, Ordering::SeqCst);

        let outcome = service.deduplicate("f", vec![msg("a")]);
        assert_eq!(outcome.new_messages, vec![msg("a")]);
        assert!(matches!(outcome.record_error, Some(Error::OperationFailed { .. })));
        assert!(!outcome.is_recorded());

        // Nothing landed, so the retry still sees the message as new
        service.cache().store().fail_writes.store(false, Ordering::SeqCst);
        let retry = service.deduplicate("f", vec![msg("a")]);
        assert_eq!(retry.new_messages, vec![msg("a")]);
    }

    #[test]
    fn test_expiry_failure_keeps_write() {
        let service = service();
        service.cache().store().fail_scans.store(true, Ordering::SeqCst);

        let outcome = service.deduplicate("f", vec![msg("a"), msg("a")]);
        assert_eq!(outcome.new_messages.len(), 2);
        assert!(matches!(
            outcome.record_error,
            Some(Error::ExpiryFailed { written: 1, .. })
        ));
        assert!(outcome.is_recorded());

        service.cache().store().fail_scans.store(false, Ordering::SeqCst);
        let again = service.deduplicate("f", vec![msg("a")]);
        assert!(again.new_messages.is_empty());
    }

    #[test]
    fn test_empty_input() {
        let service = service();
        let outcome = service.deduplicate("f", Vec::new());
        assert!(outcome.new_messages.is_empty());
        assert!(outcome.record_error.is_none());
    }
}
