//! Content hashing for message identity.
//!
//! A message's dedup identity is SHA3-512 over its payload followed by its
//! topic bytes. No normalization is applied: one flipped bit is a different
//! message.

use crate::models::{ContentDigest, DIGEST_LENGTH, Message, Topic};
use sha3::{Digest, Sha3_512};

/// Content hasher for deduplication.
///
/// # Example
///
/// ```rust
/// use floodgate::services::deduplication::ContentHasher;
/// use floodgate::{Message, Topic};
///
/// let a = Message::new(b"ping".to_vec(), Topic::new([1, 2, 3, 4]));
/// let b = Message::new(b"ping".to_vec(), Topic::new([1, 2, 3, 4]));
/// assert_eq!(ContentHasher::digest(&a), ContentHasher::digest(&b));
/// ```
pub struct ContentHasher;

impl ContentHasher {
    /// Computes the digest of a message.
    #[must_use]
    pub fn digest(message: &Message) -> ContentDigest {
        Self::digest_parts(&message.payload, &message.topic)
    }

    /// Computes the digest of a payload and topic without building a [`Message`].
    #[must_use]
    pub fn digest_parts(payload: &[u8], topic: &Topic) -> ContentDigest {
        let mut hasher = Sha3_512::new();
        hasher.update(payload);
        hasher.update(topic.as_bytes());

        let mut out = [0u8; DIGEST_LENGTH];
        out.copy_from_slice(&hasher.finalize());
        ContentDigest::new(out)
    }
}
