//! Content digest model.

use crate::{Error, Result};
use std::fmt;

/// Length of a content digest in bytes (SHA3-512).
pub const DIGEST_LENGTH: usize = 64;

/// Content-addressed identity of a message.
///
/// Produced by [`ContentHasher`](crate::services::deduplication::ContentHasher);
/// two messages with the same payload and topic always share a digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest([u8; DIGEST_LENGTH]);

impl ContentDigest {
    /// Wraps raw digest bytes.
    #[must_use]
    pub const fn new(bytes: [u8; DIGEST_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Builds a digest from a byte slice.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the slice is not exactly
    /// [`DIGEST_LENGTH`] bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; DIGEST_LENGTH] = bytes.try_into().map_err(|_| {
            Error::InvalidInput(format!(
                "digest must be {DIGEST_LENGTH} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    /// Returns the raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; DIGEST_LENGTH] {
        &self.0
    }

    /// Returns the lowercase hex encoding (128 characters).
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Returns the first eight hex characters, for log lines.
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", self.short())
    }
}
