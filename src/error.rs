//! Error types for the session store and its collaborators.

use thiserror::Error;

/// Failure calling the completion collaborator.
#[derive(Error, Debug)]
pub enum CompletionError {
    /// The request could not be sent, or the service answered with a
    /// non-success status.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered, but the reply field was missing or unreadable.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl CompletionError {
    /// Short machine-readable kind, used in API payloads.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::MalformedResponse(_) => "malformed_response",
        }
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Failure reading or writing the persistent key-value medium.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The medium could not be read or written for `key`.
    #[error("storage unavailable for key `{key}`: {source}")]
    Unavailable {
        /// Key being accessed.
        key: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// A record for `key` could not be encoded; nothing was written.
    #[error("failed to encode record for key `{key}`: {source}")]
    Encode {
        /// Key being written.
        key: String,
        /// Underlying serialization failure.
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    pub(crate) fn unavailable(key: &str, source: std::io::Error) -> Self {
        Self::Unavailable {
            key: key.to_string(),
            source,
        }
    }
}

/// Rejections surfaced by the session store's operation surface.
#[derive(Error, Debug)]
pub enum SessionError {
    /// No session with this id is registered.
    #[error("session not found: {0}")]
    NotFound(String),

    /// A send is already outstanding for this session.
    #[error("session {0} already has a message in flight")]
    Busy(String),

    /// The session's stored messages could not be read.
    #[error("session history unavailable: {0}")]
    Storage(#[from] StorageError),
}

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
