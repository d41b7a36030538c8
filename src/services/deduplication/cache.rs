//! Date-bucketed dedup cache.
//!
//! Sightings live in day buckets (see [`keys`](super::keys)). A message is
//! "seen" if its key is in today's or yesterday's bucket, where yesterday is
//! `now - 24h` read from the injected clock on every call. The boundary
//! slides with the clock instead of snapping at midnight.
//!
//! Expiry piggybacks on writes: every [`DedupCache::put`] deletes all buckets
//! older than yesterday with one range scan and one batch. An idle cache pays
//! nothing and may keep stale buckets until the next write, which never
//! changes a membership answer because lookups only ever consult the two
//! live buckets.

use super::clock::{Clock, SystemClock};
use super::hasher::ContentHasher;
use super::keys::{self, BucketKey};
use super::types::PutReport;
use crate::models::{ContentDigest, Message};
use crate::storage::{KvStore, WriteBatch};
use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tracing::instrument;

/// Number of day buckets a sighting stays visible in.
pub const RETENTION_BUCKETS: usize = 2;

/// Converts usize to f64 for metrics, capping at `u32::MAX`.
#[inline]
fn usize_to_f64(value: usize) -> f64 {
    let capped = u32::try_from(value).unwrap_or(u32::MAX);
    f64::from(capped)
}

/// Two-day, content-addressed dedup cache over an ordered key-value store.
///
/// The cache owns its store handle and clock; callers deal only in filter
/// identities and messages, never raw keys.
///
/// # Example
///
/// ```rust
/// use chrono::{Duration, TimeZone, Utc};
/// use floodgate::services::deduplication::DedupCache;
/// use floodgate::{ManualClock, MemoryStore, Message, Topic};
/// use std::sync::Arc;
///
/// let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2018, 4, 25, 10, 0, 0).unwrap()));
/// let cache = DedupCache::with_clock(MemoryStore::new(), Arc::clone(&clock));
/// let msg = Message::new(b"ping".to_vec(), Topic::new([1, 2, 3, 4]));
///
/// cache.put("filterA", std::slice::from_ref(&msg))?;
/// assert!(cache.has("filterA", &msg)?);
///
/// clock.advance(Duration::hours(38) + Duration::minutes(1));
/// assert!(!cache.has("filterA", &msg)?);
/// # Ok::<(), floodgate::Error>(())
/// ```
pub struct DedupCache<S: KvStore, C: Clock = SystemClock> {
    store: S,
    clock: C,
}

impl<S: KvStore> DedupCache<S, SystemClock> {
    /// Creates a cache reading wall-clock time.
    #[must_use]
    pub const fn new(store: S) -> Self {
        Self {
            store,
            clock: SystemClock,
        }
    }
}

impl<S: KvStore, C: Clock> DedupCache<S, C> {
    /// Creates a cache with an explicit time source.
    #[must_use]
    pub const fn with_clock(store: S, clock: C) -> Self {
        Self { store, clock }
    }

    /// Returns the underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Returns the time source.
    #[must_use]
    pub const fn clock(&self) -> &C {
        &self.clock
    }

    /// Checks whether `message` was recorded for `filter_id` today or yesterday.
    ///
    /// # Errors
    ///
    /// Propagates store read failures. A missing key is `Ok(false)`.
    pub fn has(&self, filter_id: &str, message: &Message) -> Result<bool> {
        self.has_digest(filter_id, &ContentHasher::digest(message))
    }

    /// Checks membership for a precomputed digest.
    ///
    /// # Errors
    ///
    /// Propagates store read failures. A missing key is `Ok(false)`.
    #[instrument(
        skip(self, digest),
        fields(operation = "dedup_has", digest = %digest.short())
    )]
    pub fn has_digest(&self, filter_id: &str, digest: &ContentDigest) -> Result<bool> {
        let now = self.clock.now();

        for (bucket, date) in window_dates(now).iter().enumerate() {
            let key = keys::encode_key(date, filter_id, digest);
            if self.store.has(&key)? {
                tracing::trace!(bucket = %date, "Sighting found");
                metrics::counter!(
                    "dedup_cache_lookups_total",
                    "result" => if bucket == 0 { "today" } else { "yesterday" }
                )
                .increment(1);
                return Ok(true);
            }
        }

        metrics::counter!("dedup_cache_lookups_total", "result" => "miss").increment(1);
        Ok(false)
    }

    /// Records `messages` in today's bucket, then expires stale buckets.
    ///
    /// All entries are written in one atomic batch. The expiry sweep runs
    /// only after that batch commits. Repeated messages share one key and
    /// count once in [`PutReport::written`].
    ///
    /// # Errors
    ///
    /// - [`Error::OperationFailed`] if the batch write fails; nothing was written.
    /// - [`Error::ExpiryFailed`] if the batch committed but the sweep failed.
    ///   The new entries are durable; stale buckets linger until the next put.
    #[instrument(
        skip(self, messages),
        fields(operation = "dedup_put", message_count = messages.len())
    )]
    pub fn put(&self, filter_id: &str, messages: &[Message]) -> Result<PutReport> {
        let now = self.clock.now();
        let today = keys::date_string(now);

        // Repeats collapse to one key so `written` counts distinct entries.
        let staged: BTreeSet<Vec<u8>> = messages
            .iter()
            .map(|message| keys::encode_key(&today, filter_id, &ContentHasher::digest(message)))
            .collect();
        let mut batch = WriteBatch::new();
        for key in staged {
            batch.put(key, Vec::new());
        }

        let written = batch.len();
        if !batch.is_empty() {
            self.store.write_batch(batch)?;
            metrics::counter!("dedup_cache_entries_written_total").increment(written as u64);
            tracing::debug!(written, bucket = %today, "Recorded sightings");
        }

        let expired = self.expire_before(now).map_err(|e| {
            tracing::warn!(error = %e, written, "Bucket expiry failed after successful write");
            Error::ExpiryFailed {
                written,
                cause: e.to_string(),
            }
        })?;

        Ok(PutReport { written, expired })
    }

    /// Deletes every bucket strictly older than yesterday.
    ///
    /// Returns the number of keys removed.
    ///
    /// # Errors
    ///
    /// Propagates range-scan or batch-delete failures.
    pub fn expire_stale_buckets(&self) -> Result<usize> {
        self.expire_before(self.clock.now())
    }

    /// Counts stored entries per bucket date (`YYYYMMDD`).
    ///
    /// Keys that do not decode are counted under `"invalid"`.
    ///
    /// # Errors
    ///
    /// Propagates range-scan failures.
    pub fn bucket_counts(&self) -> Result<BTreeMap<String, usize>> {
        let (start, limit) = keys::keyspace_range();
        let mut counts = BTreeMap::new();

        for key in self.store.scan_range(&start, &limit)? {
            let bucket = BucketKey::parse(&key)
                .map_or_else(|_| "invalid".to_string(), |k| k.date_string());
            *counts.entry(bucket).or_insert(0) += 1;
        }

        Ok(counts)
    }

    #[instrument(skip(self), fields(operation = "dedup_expire"))]
    fn expire_before(&self, now: DateTime<Utc>) -> Result<usize> {
        let [_, yesterday] = window_dates(now);
        let (start, limit) = keys::expiry_range(&yesterday);

        let stale = self.store.scan_range(&start, &limit)?;
        if stale.is_empty() {
            return Ok(0);
        }

        let mut batch = WriteBatch::new();
        for key in stale {
            batch.delete(key);
        }
        let expired = batch.len();
        self.store.write_batch(batch)?;

        metrics::counter!("dedup_expired_keys_total").increment(expired as u64);
        metrics::histogram!("dedup_expiry_batch_size").record(usize_to_f64(expired));
        tracing::info!(expired, cutoff = %yesterday, "Expired stale dedup buckets");

        Ok(expired)
    }
}

/// Returns the live bucket dates for `now`: today first, then yesterday.
fn window_dates(now: DateTime<Utc>) -> [String; RETENTION_BUCKETS] {
    [
        keys::date_string(now),
        keys::date_string(now - Duration::hours(24)),
    ]
}
