//! Message sources feeding the deduplicator.
//!
//! The pub/sub transport sits behind [`MessageSource`]; [`FilterMessages`]
//! pairs a source with a [`Deduplicator`] to answer "what is new for this
//! filter since I last asked".

use super::types::{DeduplicationOutcome, Deduplicator};
use crate::models::{Message, MessageRecord};
use crate::{Error, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::instrument;

/// Fetches the messages currently held for a filter.
pub trait MessageSource: Send + Sync {
    /// Returns the messages for `filter_id`, in delivery order.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying transport cannot be read.
    fn filter_messages(&self, filter_id: &str) -> Result<Vec<Message>>;
}

/// In-memory source, keyed by filter.
#[derive(Debug, Default)]
pub struct MemorySource {
    messages: RwLock<HashMap<String, Vec<Message>>>,
}

impl MemorySource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message delivered to `filter_id`.
    pub fn push(&self, filter_id: &str, message: Message) {
        let mut messages = self
            .messages
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        messages.entry(filter_id.to_string()).or_default().push(message);
    }
}

impl MessageSource for MemorySource {
    fn filter_messages(&self, filter_id: &str) -> Result<Vec<Message>> {
        let messages = self
            .messages
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(messages.get(filter_id).cloned().unwrap_or_default())
    }
}

/// Source backed by a JSON-lines file of [`MessageRecord`]s.
///
/// The file is re-read on every call, so appending to it between calls
/// behaves like a transport that keeps redelivering its buffer.
#[derive(Debug, Clone)]
pub struct JsonLinesSource {
    path: PathBuf,
}

impl JsonLinesSource {
    /// Creates a source reading from `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MessageSource for JsonLinesSource {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn filter_messages(&self, filter_id: &str) -> Result<Vec<Message>> {
        let file = File::open(&self.path).map_err(|e| Error::OperationFailed {
            operation: "open_message_file".to_string(),
            cause: format!("{}: {e}", self.path.display()),
        })?;
        read_records(BufReader::new(file), filter_id)
    }
}

/// Reads JSON-lines records, keeping those that apply to `filter_id`.
///
/// Blank lines are skipped.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] on read errors and
/// [`Error::InvalidInput`] naming the line number on malformed records.
pub fn read_records<R: BufRead>(reader: R, filter_id: &str) -> Result<Vec<Message>> {
    let mut messages = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line.map_err(|e| Error::OperationFailed {
            operation: "read_messages".to_string(),
            cause: e.to_string(),
        })?;
        if line.trim().is_empty() {
            continue;
        }

        let record: MessageRecord = serde_json::from_str(&line)
            .map_err(|e| Error::InvalidInput(format!("line {line_no}: {e}")))?;
        if !record.matches_filter(filter_id) {
            continue;
        }
        let message = record
            .to_message()
            .map_err(|e| Error::InvalidInput(format!("line {line_no}: {e}")))?;
        messages.push(message);
    }

    Ok(messages)
}

/// Fetches a filter's messages and hands back only the unseen ones.
///
/// # Example
///
/// ```rust
/// use floodgate::services::deduplication::{
///     DedupCache, DeduplicationService, FilterMessages, MemorySource,
/// };
/// use floodgate::{MemoryStore, Message, Topic};
///
/// let source = MemorySource::new();
/// source.push("room", Message::new(b"hi".to_vec(), Topic::new([0, 0, 0, 1])));
///
/// let api = FilterMessages::new(
///     source,
///     DeduplicationService::new(DedupCache::new(MemoryStore::new())),
/// );
/// assert_eq!(api.new_filter_messages("room")?.new_messages.len(), 1);
/// assert!(api.new_filter_messages("room")?.new_messages.is_empty());
/// # Ok::<(), floodgate::Error>(())
/// ```
pub struct FilterMessages<Src: MessageSource, D: Deduplicator> {
    source: Src,
    deduplicator: D,
}

impl<Src: MessageSource, D: Deduplicator> FilterMessages<Src, D> {
    /// Creates the pairing.
    #[must_use]
    pub const fn new(source: Src, deduplicator: D) -> Self {
        Self {
            source,
            deduplicator,
        }
    }

    /// Returns the message source.
    #[must_use]
    pub const fn source(&self) -> &Src {
        &self.source
    }

    /// Returns the deduplicator.
    #[must_use]
    pub const fn deduplicator(&self) -> &D {
        &self.deduplicator
    }

    /// Returns the messages for `filter_id` not seen within the window.
    ///
    /// # Errors
    ///
    /// Returns the source's error if the messages cannot be fetched. Store
    /// failures do not error here; see [`DeduplicationOutcome::record_error`].
    #[instrument(skip(self))]
    pub fn new_filter_messages(&self, filter_id: &str) -> Result<DeduplicationOutcome> {
        let messages = self.source.filter_messages(filter_id)?;
        Ok(self.deduplicator.deduplicate(filter_id, messages))
    }
}
