//! Catalog of known sessions.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageResult;
use crate::storage::{KeyValueStore, encode_record};

/// Storage key of the registry record.
pub const REGISTRY_KEY: &str = "chat-sessions";

/// Schema version written into the registry record.
const REGISTRY_VERSION: u32 = 1;

/// Metadata of one session, independent of its messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMeta {
    /// Opaque unique id; also the storage key of the session's messages.
    pub id: String,
    /// Display label, fixed at creation.
    pub name: String,
    /// Creation time. Records written without it load as the Unix epoch.
    #[serde(default)]
    pub created_at: DateTime<Utc>,
}

impl SessionMeta {
    /// Metadata for a session created now.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Serialize)]
struct RegistryRecordRef<'a> {
    version: u32,
    sessions: &'a [SessionMeta],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RegistryRecord {
    Versioned {
        #[allow(dead_code)]
        version: u32,
        sessions: Vec<SessionMeta>,
    },
    Bare(Vec<SessionMeta>),
}

/// Insertion-ordered list of sessions, persisted under [`REGISTRY_KEY`].
///
/// Loaded once at construction; every mutation rewrites the whole record.
#[derive(Debug)]
pub struct SessionRegistry {
    store: Arc<dyn KeyValueStore>,
    sessions: RwLock<Vec<SessionMeta>>,
}

impl SessionRegistry {
    /// Load the registry from `store`.
    ///
    /// An absent, unreadable or malformed record yields an empty registry.
    #[must_use]
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let sessions = match store.get(REGISTRY_KEY) {
            Ok(Some(raw)) => parse_record(&raw),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read session registry");
                Vec::new()
            }
        };

        tracing::debug!(session_count = sessions.len(), "Session registry loaded");

        Self {
            store,
            sessions: RwLock::new(sessions),
        }
    }

    /// All sessions in insertion order.
    #[must_use]
    pub fn list(&self) -> Vec<SessionMeta> {
        self.sessions.read().unwrap().clone()
    }

    /// Check if a session is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.sessions.read().unwrap().iter().any(|s| s.id == id)
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    /// Check if no sessions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `session` and persist.
    ///
    /// Adding an id that is already registered changes nothing.
    pub fn add(&self, session: SessionMeta) -> StorageResult<()> {
        let mut guard = self.sessions.write().unwrap();
        if guard.iter().any(|s| s.id == session.id) {
            return Ok(());
        }
        guard.push(session);
        self.persist(&guard)
    }

    /// Remove the session with `id` and persist.
    ///
    /// Returns whether an entry was removed. Unknown ids are a no-op and do
    /// not touch storage.
    pub fn remove(&self, id: &str) -> StorageResult<bool> {
        let mut guard = self.sessions.write().unwrap();
        let before = guard.len();
        guard.retain(|s| s.id != id);
        if guard.len() == before {
            return Ok(false);
        }
        self.persist(&guard).map(|()| true)
    }

    fn persist(&self, sessions: &[SessionMeta]) -> StorageResult<()> {
        let record = RegistryRecordRef {
            version: REGISTRY_VERSION,
            sessions,
        };
        let raw = encode_record(REGISTRY_KEY, &record)?;
        self.store.set(REGISTRY_KEY, &raw)
    }
}

fn parse_record(raw: &str) -> Vec<SessionMeta> {
    match serde_json::from_str::<RegistryRecord>(raw) {
        Ok(RegistryRecord::Versioned { sessions, .. } | RegistryRecord::Bare(sessions)) => {
            dedup_by_id(sessions)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Discarding malformed session registry");
            Vec::new()
        }
    }
}

/// Keep the first entry of every id.
///
/// An entry whose id is [`REGISTRY_KEY`] would alias the registry record
/// itself and is dropped.
fn dedup_by_id(sessions: Vec<SessionMeta>) -> Vec<SessionMeta> {
    let mut out: Vec<SessionMeta> = Vec::with_capacity(sessions.len());
    for session in sessions {
        if session.id == REGISTRY_KEY {
            tracing::warn!(id = %session.id, "Dropping session entry with reserved id");
            continue;
        }
        if !out.iter().any(|s| s.id == session.id) {
            out.push(session);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn find(registry: &SessionRegistry, id: &str) -> SessionMeta {
        registry
            .list()
            .into_iter()
            .find(|s| s.id == id)
            .expect("session should be registered")
    }

    fn empty() -> (Arc<MemoryStore>, SessionRegistry) {
        let kv = Arc::new(MemoryStore::new());
        let registry = SessionRegistry::load(kv.clone());
        (kv, registry)
    }

    #[test]
    fn test_add_persists_in_order() {
        let (kv, registry) = empty();
        assert!(registry.is_empty());

        registry.add(SessionMeta::new("a", "First")).unwrap();
        registry.add(SessionMeta::new("b", "Second")).unwrap();

        let reloaded = SessionRegistry::load(kv);
        let ids: Vec<_> = reloaded.list().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(find(&reloaded, "b").name, "Second");
    }

    #[test]
    fn test_duplicate_add_is_ignored() {
        let (_kv, registry) = empty();
        registry.add(SessionMeta::new("a", "First")).unwrap();
        registry.add(SessionMeta::new("a", "Again")).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(find(&registry, "a").name, "First");
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (kv, registry) = empty();
        registry.add(SessionMeta::new("a", "First")).unwrap();

        assert!(registry.remove("a").unwrap());
        assert!(!registry.remove("a").unwrap());
        assert!(!registry.contains("a"));
        assert!(SessionRegistry::load(kv).is_empty());
    }

    #[test]
    fn test_malformed_record_loads_empty() {
        let kv = Arc::new(MemoryStore::new());
        kv.set(REGISTRY_KEY, "{\"sessions\": 42}").unwrap();

        assert!(SessionRegistry::load(kv).is_empty());
    }

    #[test]
    fn test_bare_array_loads_and_dedups() {
        let kv = Arc::new(MemoryStore::new());
        kv.set(
            REGISTRY_KEY,
            r#"[{"id":"a","name":"One"},{"id":"b","name":"Two"},{"id":"a","name":"Dup"}]"#,
        )
        .unwrap();

        let registry = SessionRegistry::load(kv.clone());
        assert_eq!(registry.len(), 2);
        assert_eq!(find(&registry, "a").name, "One");
        assert_eq!(find(&registry, "a").created_at, DateTime::<Utc>::default());

        // The next mutation rewrites the record in the versioned layout.
        registry.remove("b").unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&kv.get(REGISTRY_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(raw["version"], 1);
        assert_eq!(raw["sessions"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_reserved_id_is_dropped_on_load() {
        let kv = Arc::new(MemoryStore::new());
        kv.set(
            REGISTRY_KEY,
            r#"{"version":1,"sessions":[{"id":"chat-sessions","name":"Alias"},{"id":"a","name":"One"}]}"#,
        )
        .unwrap();

        let registry = SessionRegistry::load(kv);
        assert_eq!(registry.len(), 1);
        assert!(!registry.contains(REGISTRY_KEY));
        assert!(registry.contains("a"));
    }
}
