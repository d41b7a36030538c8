//! Pub/sub message model.

use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Length of a topic in bytes.
pub const TOPIC_LENGTH: usize = 4;

/// A fixed-size message topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Topic([u8; TOPIC_LENGTH]);

impl Topic {
    /// Creates a topic from raw bytes.
    #[must_use]
    pub const fn new(bytes: [u8; TOPIC_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Returns the raw topic bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; TOPIC_LENGTH] {
        &self.0
    }

    /// Parses a topic from hex, with or without a `0x` prefix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the string is not valid hex or does
    /// not decode to exactly four bytes.
    ///
    /// # Example
    ///
    /// ```rust
    /// use floodgate::Topic;
    ///
    /// let topic = Topic::from_hex("0x01020304")?;
    /// assert_eq!(topic.as_bytes(), &[1, 2, 3, 4]);
    /// # Ok::<(), floodgate::Error>(())
    /// ```
    pub fn from_hex(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        let bytes = hex::decode(digits)
            .map_err(|e| Error::InvalidInput(format!("topic '{s}' is not valid hex: {e}")))?;

        let array: [u8; TOPIC_LENGTH] = bytes.try_into().map_err(|b: Vec<u8>| {
            Error::InvalidInput(format!(
                "topic '{s}' must be {TOPIC_LENGTH} bytes, got {}",
                b.len()
            ))
        })?;

        Ok(Self(array))
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Topic {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl From<[u8; TOPIC_LENGTH]> for Topic {
    fn from(bytes: [u8; TOPIC_LENGTH]) -> Self {
        Self(bytes)
    }
}

/// A message as delivered by the pub/sub transport.
///
/// Dedup identity is derived from `payload` and `topic` only; there is no
/// separate message ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Opaque message body.
    pub payload: Vec<u8>,
    /// Topic the message was published under.
    pub topic: Topic,
}

impl Message {
    /// Creates a new message.
    #[must_use]
    pub fn new(payload: impl Into<Vec<u8>>, topic: Topic) -> Self {
        Self {
            payload: payload.into(),
            topic,
        }
    }
}
