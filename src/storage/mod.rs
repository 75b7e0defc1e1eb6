//! Persistent key-value storage.
//!
//! The session store keeps its state in a durable, synchronous, string-keyed
//! medium. This module defines that contract and ships two media:
//!
//! - [`MemoryStore`]: process-local map, for tests and ephemeral runs
//! - [`FileStore`]: one file per key under a data directory
//!
//! Values are opaque text; callers decide the encoding (JSON in practice).

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use serde::Serialize;

use crate::error::{StorageError, StorageResult};

/// Synchronous string-keyed storage.
///
/// Implementations must be safe to share between tasks; the session store
/// holds them behind an `Arc`.
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    /// Read the value stored under `key`, or `None` when absent.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Remove `key`. Removing an absent key succeeds.
    fn remove(&self, key: &str) -> StorageResult<()>;
}

/// Encode `record` as the JSON text stored under `key`.
pub(crate) fn encode_record<T: Serialize + ?Sized>(key: &str, record: &T) -> StorageResult<String> {
    serde_json::to_string(record).map_err(|source| StorageError::Encode {
        key: key.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_encode_record() {
        let raw = encode_record("k", &vec!["a", "b"]).unwrap();
        assert_eq!(raw, r#"["a","b"]"#);
    }

    #[test]
    fn test_encode_failure_names_key() {
        // JSON object keys must be strings.
        let record: HashMap<(u8, u8), u8> = HashMap::from([((1, 2), 3)]);

        let err = encode_record("chat-sessions", &record).unwrap_err();
        assert!(matches!(err, StorageError::Encode { ref key, .. } if key == "chat-sessions"));
        assert!(err.to_string().contains("chat-sessions"));
    }
}
