//! Per-session message history.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::llm::MessageRole;
use crate::storage::{KeyValueStore, encode_record};

/// Schema version written into every sequence record.
const SEQUENCE_VERSION: u32 = 1;

/// A single chat turn. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique within its session.
    pub id: String,
    /// Author of the turn.
    pub role: MessageRole,
    /// Text of the turn.
    pub content: String,
}

impl Message {
    /// New user turn with a fresh id.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// New assistant turn with a fresh id.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct SequenceRecordRef<'a> {
    version: u32,
    messages: &'a [Message],
}

/// On-disk forms accepted when loading.
#[derive(Deserialize)]
#[serde(untagged)]
enum SequenceRecord {
    Versioned {
        #[allow(dead_code)]
        version: u32,
        messages: Vec<Message>,
    },
    /// Unversioned layout: a bare array of messages.
    Bare(Vec<Message>),
}

impl SequenceRecord {
    fn into_messages(self) -> Vec<Message> {
        match self {
            Self::Versioned { messages, .. } | Self::Bare(messages) => messages,
        }
    }
}

/// Message sequences keyed by session id.
///
/// The session id itself is the storage key. Every save overwrites the whole
/// sequence.
#[derive(Debug, Clone)]
pub struct MessageSequence {
    store: Arc<dyn KeyValueStore>,
}

impl MessageSequence {
    /// Create a sequence store over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Load the sequence of `session_id`.
    ///
    /// Absent and malformed records load as empty; the latter is logged.
    ///
    /// # Errors
    ///
    /// [`StorageError::Unavailable`](crate::error::StorageError) when the
    /// medium cannot be read. Callers must not save over a sequence they
    /// failed to read.
    pub fn load(&self, session_id: &str) -> StorageResult<Vec<Message>> {
        let Some(raw) = self.store.get(session_id)? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str::<SequenceRecord>(&raw) {
            Ok(record) => Ok(record.into_messages()),
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Discarding malformed message sequence");
                Ok(Vec::new())
            }
        }
    }

    /// Overwrite the sequence of `session_id` with `messages`.
    pub fn save(&self, session_id: &str, messages: &[Message]) -> StorageResult<()> {
        let record = SequenceRecordRef {
            version: SEQUENCE_VERSION,
            messages,
        };
        let raw = encode_record(session_id, &record)?;
        self.store.set(session_id, &raw)
    }

    /// Remove the sequence of `session_id` entirely.
    pub fn delete(&self, session_id: &str) -> StorageResult<()> {
        self.store.remove(session_id)
    }
}
