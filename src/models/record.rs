//! JSON-lines wire form of a message.

use super::{Message, Topic};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// How a record's payload string is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadEncoding {
    /// Payload is the UTF-8 text itself.
    #[default]
    Utf8,
    /// Payload is hex-encoded bytes.
    Hex,
}

/// One message as read from or written to a JSON-lines stream.
///
/// ```json
/// {"filter":"filterA","topic":"0x01020304","payload":"ping"}
/// {"topic":"0x01020304","payload":"00ff","encoding":"hex"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Filter the message belongs to. Absent means "any filter".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Topic as hex, `0x` prefix optional.
    pub topic: String,
    /// Payload text in the given encoding.
    pub payload: String,
    /// Payload encoding.
    #[serde(default, skip_serializing_if = "is_utf8")]
    pub encoding: PayloadEncoding,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_utf8(encoding: &PayloadEncoding) -> bool {
    *encoding == PayloadEncoding::Utf8
}

impl MessageRecord {
    /// Builds a record from a message, picking UTF-8 when the payload allows it.
    #[must_use]
    pub fn from_message(message: &Message, filter: Option<&str>) -> Self {
        let (payload, encoding) = match std::str::from_utf8(&message.payload) {
            Ok(text) => (text.to_string(), PayloadEncoding::Utf8),
            Err(_) => (hex::encode(&message.payload), PayloadEncoding::Hex),
        };
        Self {
            filter: filter.map(str::to_string),
            topic: message.topic.to_string(),
            payload,
            encoding,
        }
    }

    /// Returns true if the record applies to `filter_id`.
    #[must_use]
    pub fn matches_filter(&self, filter_id: &str) -> bool {
        self.filter.as_deref().is_none_or(|f| f == filter_id)
    }

    /// Decodes the record into a message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the topic or a hex payload is malformed.
    pub fn to_message(&self) -> Result<Message> {
        let topic = Topic::from_hex(&self.topic)?;
        let payload = match self.encoding {
            PayloadEncoding::Utf8 => self.payload.as_bytes().to_vec(),
            PayloadEncoding::Hex => hex::decode(&self.payload)
                .map_err(|e| Error::InvalidInput(format!("payload is not valid hex: {e}")))?,
        };
        Ok(Message::new(payload, topic))
    }
}
