//! Deduplication result types.

use crate::models::Message;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// How one candidate message was classified.
///
/// # Variants
///
/// - `New`: not present in today's or yesterday's bucket
/// - `Duplicate`: already seen within the window, dropped silently
/// - `CheckFailed`: the store could not answer, delivered anyway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Not seen within the window.
    New,
    /// Seen within the window.
    Duplicate,
    /// Membership lookup failed; treated as new.
    CheckFailed,
}

impl MessageStatus {
    /// Returns the status as a metric label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Duplicate => "duplicate",
            Self::CheckFailed => "check_failed",
        }
    }

    /// Returns true if the message is delivered to the caller.
    #[must_use]
    pub const fn is_delivered(self) -> bool {
        matches!(self, Self::New | Self::CheckFailed)
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a successful [`DedupCache::put`](super::DedupCache::put) did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PutReport {
    /// Distinct entries written into today's bucket.
    pub written: usize,
    /// Stale keys removed by the expiry sweep.
    pub expired: usize,
}

/// Result of one deduplication pass.
///
/// The pass itself never fails: store errors are folded in so that the
/// caller always gets the messages it should deliver.
#[derive(Debug, Default)]
pub struct DeduplicationOutcome {
    /// Messages to deliver, in input order.
    pub new_messages: Vec<Message>,
    /// Messages dropped because they were already seen.
    pub duplicates: usize,
    /// Messages delivered because their membership lookup failed.
    pub check_failures: usize,
    /// Failure of the final batched record, if any.
    ///
    /// When set, the delivered messages may be reported as new again on a
    /// later pass (unless the error is [`Error::ExpiryFailed`], in which
    /// case the record itself landed).
    pub record_error: Option<Error>,
    /// Duration of the pass in milliseconds.
    pub duration_ms: u64,
}

impl DeduplicationOutcome {
    /// Returns true if every delivered message is now recorded.
    #[must_use]
    pub fn is_recorded(&self) -> bool {
        self.record_error
            .as_ref()
            .is_none_or(Error::write_landed)
    }

    /// Converts the outcome into a plain result.
    ///
    /// # Errors
    ///
    /// Returns the record error, if any. The delivered messages are dropped
    /// in that case, so callers that must not lose them should read the
    /// fields directly instead.
    pub fn into_result(self) -> Result<Vec<Message>> {
        match self.record_error {
            Some(err) => Err(err),
            None => Ok(self.new_messages),
        }
    }
}

/// Trait for deduplicating batches of messages.
///
/// Allows for different implementations (e.g., a pass-through for testing).
pub trait Deduplicator: Send + Sync {
    /// Filters `messages` down to the ones not seen by `filter_id` within
    /// the retention window, and records them.
    fn deduplicate(&self, filter_id: &str, messages: Vec<Message>) -> DeduplicationOutcome;
}
