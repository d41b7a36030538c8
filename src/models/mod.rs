//! Data models for floodgate.
//!
//! Messages are consumed from the pub/sub transport, never owned: the cache
//! only ever looks at their payload and topic bytes.

mod digest;
mod message;
mod record;

pub use digest::{ContentDigest, DIGEST_LENGTH};
pub use message::{Message, TOPIC_LENGTH, Topic};
pub use record::{MessageRecord, PayloadEncoding};
