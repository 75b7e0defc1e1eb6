use std::fmt::Write as _;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::KeyValueStore;
use crate::error::{StorageError, StorageResult};

/// File-backed key-value store.
///
/// Each key is one `<encoded key>.json` file under the root directory.
/// Writes land in a temporary sibling first and are renamed into place, so a
/// record on disk is always either the old or the new value.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    /// Serializes writers so temporary files never collide.
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|e| StorageError::unavailable(&root.display().to_string(), e))?;

        tracing::debug!(root = %root.display(), "File store opened");

        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Directory holding the records.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", encode_key(key)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::unavailable(key, e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let target = self.path_for(key);
        let tmp = target.with_extension("json.tmp");

        let _guard = self.write_lock.lock().unwrap();
        fs::write(&tmp, value).map_err(|e| StorageError::unavailable(key, e))?;
        fs::rename(&tmp, &target).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            StorageError::unavailable(key, e)
        })
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let _guard = self.write_lock.lock().unwrap();
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::unavailable(key, e)),
        }
    }
}

/// Map an arbitrary key to a safe file stem.
///
/// ASCII alphanumerics, `-` and `_` pass through; every other byte becomes
/// `%XX`. The mapping is injective, so distinct keys never share a file.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_key() {
        assert_eq!(encode_key("chat-sessions"), "chat-sessions");
        assert_eq!(encode_key("a/b"), "a%2Fb");
        assert_eq!(encode_key("../x"), "%2E%2E%2Fx");
        assert_eq!(encode_key("%"), "%25");
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();

        let store = FileStore::open(dir.path()).unwrap();
        store.set("session-1", "[1,2,3]").unwrap();
        drop(store);

        let reopened = FileStore::open(dir.path()).unwrap();
        assert_eq!(
            reopened.get("session-1").unwrap().as_deref(),
            Some("[1,2,3]")
        );
        assert!(reopened.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_file_store_overwrite_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("nested")).unwrap();

        store.set("k", "old").unwrap();
        store.set("k", "new").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("new"));

        store.remove("k").unwrap();
        assert!(store.get("k").unwrap().is_none());
        // Removing again is fine.
        store.remove("k").unwrap();

        let leftovers: Vec<_> = fs::read_dir(store.root()).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_unreadable_record_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        // A directory where the record file should be cannot be read as text.
        fs::create_dir(store.path_for("blocked")).unwrap();
        let err = store.get("blocked").unwrap_err();
        assert!(matches!(err, StorageError::Unavailable { ref key, .. } if key == "blocked"));
    }
}
