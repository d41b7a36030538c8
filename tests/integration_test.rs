//! Integration tests for floodgate.
//!
//! Drives the public API end to end with a manual clock: key layout, the
//! two-day window, expiry on write and the deduplicator facade.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use floodgate::services::deduplication::{
    BucketKey, ContentHasher, FilterMessages, MemorySource, keys,
};
use floodgate::{
    DedupCache, DeduplicationService, Deduplicator, Error, KvStore, ManualClock, MemoryStore,
    Message, Topic, WriteBatch,
};
use sha3::{Digest, Sha3_512};
use std::sync::Arc;

type Cache = DedupCache<Arc<MemoryStore>, Arc<ManualClock>>;

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

fn setup(now: DateTime<Utc>) -> (Arc<MemoryStore>, Arc<ManualClock>, Cache) {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(now));
    let cache = DedupCache::with_clock(Arc::clone(&store), Arc::clone(&clock));
    (store, clock, cache)
}

fn ping() -> Message {
    Message::new(b"ping".to_vec(), Topic::new([0x01, 0x02, 0x03, 0x04]))
}

fn msg(payload: &str) -> Message {
    Message::new(payload.as_bytes().to_vec(), Topic::new([0xca, 0xfe, 0x00, 0x01]))
}

#[test]
fn test_error_types() {
    let err = Error::InvalidInput("bad topic".to_string());
    assert!(err.to_string().contains("invalid input"));
    assert!(!err.write_landed());

    let err = Error::OperationFailed {
        operation: "write_batch".to_string(),
        cause: "disk full".to_string(),
    };
    assert!(err.to_string().contains("write_batch"));
    assert!(err.to_string().contains("disk full"));
    assert!(!err.write_landed());

    let err = Error::ExpiryFailed {
        written: 3,
        cause: "scan failed".to_string(),
    };
    assert!(err.to_string().contains("scan failed"));
    assert!(err.write_landed());
}

#[test]
fn test_stored_key_is_date_filter_digest() {
    let (store, _clock, cache) = setup(at(2018, 4, 25, 10, 0));

    cache.put("filterA", &[ping()]).unwrap();

    let mut expected = b"DD-20180425-filterA".to_vec();
    let mut hashed = b"ping".to_vec();
    hashed.extend_from_slice(&[0x01, 0x02, 0x03, 0x04]);
    expected.extend_from_slice(&Sha3_512::digest(&hashed));

    assert_eq!(store.keys(), vec![expected.clone()]);
    assert!(store.has(&expected).unwrap());

    let decoded = BucketKey::parse(&expected).unwrap();
    assert_eq!(decoded.filter_id, "filterA");
    assert_eq!(decoded.date_string(), "20180425");
    assert_eq!(decoded.digest, ContentHasher::digest(&ping()));
}

#[test]
fn test_window_spans_today_and_yesterday() {
    let (store, clock, cache) = setup(at(2018, 4, 25, 10, 0));
    cache.put("filterA", &[ping()]).unwrap();

    assert!(cache.has("filterA", &ping()).unwrap());
    assert!(!cache.has("filterB", &ping()).unwrap());

    clock.set(at(2018, 4, 26, 23, 59));
    assert!(cache.has("filterA", &ping()).unwrap());

    clock.set(at(2018, 4, 27, 0, 1));
    assert!(!cache.has("filterA", &ping()).unwrap());

    let report = cache.put("filterA", &[msg("pong")]).unwrap();
    assert_eq!(report.written, 1);
    assert_eq!(report.expired, 1);

    let digest = ContentHasher::digest(&msg("pong"));
    assert_eq!(
        store.keys(),
        vec![keys::encode_key("20180427", "filterA", &digest)]
    );
}

#[test]
fn test_write_expires_buckets_older_than_yesterday() {
    let (store, _clock, cache) = setup(at(2018, 4, 25, 12, 0));

    let mut batch = WriteBatch::new();
    for date in ["20180422", "20180423", "20180424", "20180425"] {
        batch.put(
            keys::encode_key(date, "filterA", &ContentHasher::digest(&msg(date))),
            Vec::new(),
        );
    }
    store.write_batch(batch).unwrap();

    let report = cache.put("filterA", &[msg("today")]).unwrap();
    assert_eq!(report.written, 1);
    assert_eq!(report.expired, 2);

    let counts = cache.bucket_counts().unwrap();
    assert!(!counts.contains_key("20180422"));
    assert!(!counts.contains_key("20180423"));
    assert_eq!(counts.get("20180424"), Some(&1));
    assert_eq!(counts.get("20180425"), Some(&2));
}

#[test]
fn test_sweep_runs_even_for_empty_put() {
    let (store, clock, cache) = setup(at(2018, 4, 20, 8, 0));
    cache.put("filterA", &[ping()]).unwrap();
    assert_eq!(store.len(), 1);

    clock.set(at(2018, 4, 25, 8, 0));
    let report = cache.put("filterA", &[]).unwrap();
    assert_eq!(report.written, 0);
    assert_eq!(report.expired, 1);
    assert!(store.is_empty());
}

#[test]
fn test_manual_sweep_matches_write_sweep() {
    let (store, clock, cache) = setup(at(2018, 4, 20, 8, 0));
    cache.put("a", &[msg("1"), msg("2")]).unwrap();
    cache.put("b", &[msg("3")]).unwrap();

    clock.set(at(2018, 4, 21, 8, 0));
    assert_eq!(cache.expire_stale_buckets().unwrap(), 0);

    clock.set(at(2018, 4, 22, 8, 0));
    assert_eq!(cache.expire_stale_buckets().unwrap(), 3);
    assert!(store.is_empty());
}

#[test]
fn test_deduplicate_twice_yields_nothing_new() {
    let (_store, _clock, cache) = setup(at(2018, 4, 25, 10, 0));
    let service = DeduplicationService::new(cache);
    let batch = vec![msg("a"), msg("b"), msg("c")];

    let first = service.deduplicate("filterA", batch.clone());
    assert_eq!(first.new_messages, batch);
    assert!(first.is_recorded());

    let second = service.deduplicate("filterA", batch);
    assert!(second.new_messages.is_empty());
    assert_eq!(second.duplicates, 3);
}

#[test]
fn test_deduplicate_keeps_input_order_of_unseen() {
    let (_store, _clock, cache) = setup(at(2018, 4, 25, 10, 0));
    cache.put("filterA", &[msg("b"), msg("d")]).unwrap();
    let service = DeduplicationService::new(cache);

    let outcome = service.deduplicate(
        "filterA",
        vec![msg("e"), msg("b"), msg("a"), msg("d"), msg("c")],
    );
    assert_eq!(outcome.new_messages, vec![msg("e"), msg("a"), msg("c")]);
}

#[test]
fn test_deduplicate_across_midnight() {
    let (_store, clock, cache) = setup(at(2018, 4, 25, 23, 50));
    let service = DeduplicationService::new(cache);

    service.deduplicate("filterA", vec![ping()]);
    clock.advance(Duration::minutes(20));

    // Seen yesterday, so still a duplicate and not re-recorded today
    let outcome = service.deduplicate("filterA", vec![ping()]);
    assert!(outcome.new_messages.is_empty());

    let counts = service.cache().bucket_counts().unwrap();
    assert_eq!(counts.get("20180425"), Some(&1));
    assert_eq!(counts.get("20180426"), None);
}

#[test]
fn test_new_filter_messages_end_to_end() {
    let (_store, clock, cache) = setup(at(2018, 4, 25, 10, 0));
    let source = MemorySource::new();
    source.push("room", msg("hello"));
    source.push("room", msg("world"));

    let api = FilterMessages::new(source, DeduplicationService::new(cache));
    assert_eq!(api.new_filter_messages("room").unwrap().new_messages.len(), 2);

    api.source().push("room", msg("again"));
    let outcome = api.new_filter_messages("room").unwrap();
    assert_eq!(outcome.new_messages, vec![msg("again")]);
    assert_eq!(outcome.duplicates, 2);

    // Two days later the window has rolled past everything
    clock.advance(Duration::days(2));
    assert_eq!(api.new_filter_messages("room").unwrap().new_messages.len(), 3);
}
