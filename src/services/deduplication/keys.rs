//! Date-bucketed cache key encoding.
//!
//! Every sighting is stored under
//!
//! ```text
//! "DD-" || YYYYMMDD || "-" || filter_id || digest (64 raw bytes)
//! ```
//!
//! with an empty value. The date is fixed-width and zero-padded, so byte
//! order over the keyspace is date order first. Expiry therefore never needs
//! a secondary index: every bucket older than a given day lives in the single
//! contiguous range `["DD-00000000", "DD-<day>")`.

use crate::models::{ContentDigest, DIGEST_LENGTH};
use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;

/// Prefix shared by every cache key.
pub const KEY_PREFIX: &str = "DD-";

/// Lowest possible bucket date.
pub const MIN_BUCKET_DATE: &str = "00000000";

const DATE_FORMAT: &str = "%Y%m%d";
const DATE_LEN: usize = 8;

/// Formats an instant as a bucket date (`YYYYMMDD`, UTC).
#[must_use]
pub fn date_string(at: DateTime<Utc>) -> String {
    at.format(DATE_FORMAT).to_string()
}

/// Returns the key prefix shared by every entry of one bucket.
#[must_use]
pub fn bucket_prefix(date: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(KEY_PREFIX.len() + date.len() + 1);
    key.extend_from_slice(KEY_PREFIX.as_bytes());
    key.extend_from_slice(date.as_bytes());
    key.push(b'-');
    key
}

/// Encodes the key for one (bucket, filter, digest) sighting.
#[must_use]
pub fn encode_key(date: &str, filter_id: &str, digest: &ContentDigest) -> Vec<u8> {
    let mut key = bucket_prefix(date);
    key.reserve(filter_id.len() + DIGEST_LENGTH);
    key.extend_from_slice(filter_id.as_bytes());
    key.extend_from_slice(digest.as_bytes());
    key
}

/// Returns the half-open range holding every bucket strictly older than `date`.
#[must_use]
pub fn expiry_range(date: &str) -> (Vec<u8>, Vec<u8>) {
    let mut start = KEY_PREFIX.as_bytes().to_vec();
    start.extend_from_slice(MIN_BUCKET_DATE.as_bytes());

    let mut limit = KEY_PREFIX.as_bytes().to_vec();
    limit.extend_from_slice(date.as_bytes());

    (start, limit)
}

/// Returns the half-open range holding every cache key.
#[must_use]
pub fn keyspace_range() -> (Vec<u8>, Vec<u8>) {
    // '.' is the byte after '-'
    (KEY_PREFIX.as_bytes().to_vec(), b"DD.".to_vec())
}

/// A decoded cache key.
///
/// # Example
///
/// ```rust
/// use chrono::NaiveDate;
/// use floodgate::ContentDigest;
/// use floodgate::services::deduplication::BucketKey;
///
/// let key = BucketKey {
///     date: NaiveDate::from_ymd_opt(2018, 4, 25).unwrap(),
///     filter_id: "filterA".to_string(),
///     digest: ContentDigest::new([0u8; 64]),
/// };
/// let encoded = key.encode();
/// assert!(encoded.starts_with(b"DD-20180425-filterA"));
/// assert_eq!(BucketKey::parse(&encoded)?, key);
/// # Ok::<(), floodgate::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketKey {
    /// Day the sighting was recorded.
    pub date: NaiveDate,
    /// Filter identity the sighting is scoped to.
    pub filter_id: String,
    /// Content digest of the message.
    pub digest: ContentDigest,
}

impl BucketKey {
    /// Encodes the key to its stored byte form.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let date = self.date.format(DATE_FORMAT).to_string();
        encode_key(&date, &self.filter_id, &self.digest)
    }

    /// Decodes a stored key.
    ///
    /// The digest is the trailing 64 bytes, so filter identities may contain
    /// any characters, including `-`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the key lacks the `DD-` prefix, has
    /// a malformed date, is too short to hold a digest, or carries a filter
    /// identity that is not UTF-8.
    pub fn parse(key: &[u8]) -> Result<Self> {
        let rest = key
            .strip_prefix(KEY_PREFIX.as_bytes())
            .ok_or_else(|| invalid_key(key, "missing DD- prefix"))?;

        if rest.len() < DATE_LEN + 1 + DIGEST_LENGTH {
            return Err(invalid_key(key, "too short"));
        }

        let (date_bytes, rest) = rest.split_at(DATE_LEN);
        let rest = rest
            .strip_prefix(b"-")
            .ok_or_else(|| invalid_key(key, "missing separator after date"))?;

        let date_str =
            std::str::from_utf8(date_bytes).map_err(|_| invalid_key(key, "date is not ASCII"))?;
        if !date_str.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid_key(key, "date is not numeric"));
        }
        let date = NaiveDate::parse_from_str(date_str, DATE_FORMAT)
            .map_err(|e| invalid_key(key, &format!("bad date '{date_str}': {e}")))?;

        let (filter_bytes, digest_bytes) = rest.split_at(rest.len() - DIGEST_LENGTH);
        let filter_id = String::from_utf8(filter_bytes.to_vec())
            .map_err(|_| invalid_key(key, "filter id is not UTF-8"))?;
        let digest = ContentDigest::from_slice(digest_bytes)?;

        Ok(Self {
            date,
            filter_id,
            digest,
        })
    }

    /// Returns the bucket date in key form (`YYYYMMDD`).
    #[must_use]
    pub fn date_string(&self) -> String {
        self.date.format(DATE_FORMAT).to_string()
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}-{}/{}",
            KEY_PREFIX,
            self.date_string(),
            self.filter_id,
            self.digest.short()
        )
    }
}

fn invalid_key(key: &[u8], reason: &str) -> Error {
    let shown = String::from_utf8_lossy(&key[..key.len().min(32)]).into_owned();
    Error::InvalidInput(format!("cache key '{shown}' {reason}"))
}
