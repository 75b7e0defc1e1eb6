//! Session orchestration: active conversation, send cycle, deletion.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::{CompletionError, SessionError, StorageError};
use crate::llm::{CompletionClient, MessageRole};
use crate::storage::KeyValueStore;

use super::registry::{SessionMeta, SessionRegistry};
use super::sequence::{Message, MessageSequence};
use super::title::{DEFAULT_TITLE, clean_title, title_prompt};

/// Observable state of the store, published on every change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ViewSnapshot {
    /// Session currently displayed, if any.
    pub active_session: Option<String>,
    /// Messages of the active session.
    pub messages: Vec<Message>,
    /// All known sessions in insertion order.
    pub sessions: Vec<SessionMeta>,
    /// Sessions with a send awaiting its reply.
    pub in_flight: Vec<String>,
}

/// Result of a send or retry.
#[derive(Debug)]
pub enum SendOutcome {
    /// Nothing to do: blank input, or nothing to retry.
    Skipped,
    /// A user turn was recorded and a reply requested.
    Sent(SendReport),
}

/// Everything that happened during one send.
#[derive(Debug)]
pub struct SendReport {
    /// Session the exchange belongs to.
    pub session_id: String,
    /// Set when the send created the session.
    pub created: Option<CreatedSession>,
    /// The user turn the reply answers.
    pub user_message: Message,
    /// What became of the reply.
    pub reply: ReplyOutcome,
    /// Writes that did not reach the store. The in-memory view is still
    /// updated when these occur.
    pub storage_errors: Vec<StorageError>,
}

/// A session created lazily by its first message.
#[derive(Debug)]
pub struct CreatedSession {
    /// Registered metadata.
    pub meta: SessionMeta,
    /// Why the default title was used, if title inference failed.
    pub title_error: Option<CompletionError>,
}

/// Fate of the assistant reply.
#[derive(Debug)]
pub enum ReplyOutcome {
    /// Reply appended to the session.
    Received(Message),
    /// The completion call failed; the user turn stays unanswered and can be
    /// retried.
    Failed(CompletionError),
    /// The session was deleted before the reply landed; the reply was dropped.
    Discarded,
}

/// Outcome of a deletion.
#[derive(Debug, Default)]
pub struct DeleteOutcome {
    /// Whether the session was registered.
    pub existed: bool,
    /// Writes that did not reach the store.
    pub storage_errors: Vec<StorageError>,
}

/// Current conversation state.
#[derive(Debug, Default)]
struct ActiveView {
    active: Option<String>,
    messages: Vec<Message>,
    /// Session a send is still creating while no session is displayed.
    creating: Option<String>,
}

/// Session a send lands in.
enum SendTarget {
    Existing(String),
    New(String),
}

/// Stateful core tying the registry and message sequences together.
///
/// Cloning is cheap and yields a handle to the same store. Locks are never
/// held across an `.await`, so selecting, listing and deleting proceed while
/// a send waits on the completion service.
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<SessionStoreInner>,
}

#[derive(Debug)]
struct SessionStoreInner {
    registry: SessionRegistry,
    sequences: MessageSequence,
    completion: Arc<dyn CompletionClient>,
    default_title: String,
    /// Lock order: `view`, then the registry, then `in_flight`.
    view: Mutex<ActiveView>,
    in_flight: Mutex<HashSet<String>>,
    updates: watch::Sender<ViewSnapshot>,
}

/// Holds a session's single-flight slot until dropped.
struct InFlightGuard<'a> {
    store: &'a SessionStore,
    session_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        {
            let mut view = self.store.inner.view.lock().unwrap();
            if view.creating.as_deref() == Some(self.session_id.as_str()) {
                view.creating = None;
            }
        }
        self.store
            .inner
            .in_flight
            .lock()
            .unwrap()
            .remove(&self.session_id);
        self.store.publish();
    }
}

impl SessionStore {
    /// Create a store over `store`, using the stock default title.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, completion: Arc<dyn CompletionClient>) -> Self {
        Self::with_default_title(store, completion, DEFAULT_TITLE)
    }

    /// Create a store whose title fallback is `default_title`.
    ///
    /// Loads the registry; no session is active afterwards.
    #[must_use]
    pub fn with_default_title(
        store: Arc<dyn KeyValueStore>,
        completion: Arc<dyn CompletionClient>,
        default_title: impl Into<String>,
    ) -> Self {
        let registry = SessionRegistry::load(Arc::clone(&store));
        let initial = ViewSnapshot {
            sessions: registry.list(),
            ..ViewSnapshot::default()
        };
        let (updates, _) = watch::channel(initial);

        Self {
            inner: Arc::new(SessionStoreInner {
                registry,
                sequences: MessageSequence::new(store),
                completion,
                default_title: default_title.into(),
                view: Mutex::new(ActiveView::default()),
                in_flight: Mutex::new(HashSet::new()),
                updates,
            }),
        }
    }

    /// All known sessions in insertion order.
    #[must_use]
    pub fn list_sessions(&self) -> Vec<SessionMeta> {
        self.inner.registry.list()
    }

    /// Id of the displayed session, if any.
    #[must_use]
    pub fn active_session(&self) -> Option<String> {
        self.inner.view.lock().unwrap().active.clone()
    }

    /// Messages of the displayed session.
    #[must_use]
    pub fn active_messages(&self) -> Vec<Message> {
        self.inner.view.lock().unwrap().messages.clone()
    }

    /// Check if a send is outstanding for `session_id`.
    #[must_use]
    pub fn is_in_flight(&self, session_id: &str) -> bool {
        self.inner.in_flight.lock().unwrap().contains(session_id)
    }

    /// Subscribe to state changes.
    ///
    /// The receiver starts at the current snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ViewSnapshot> {
        self.inner.updates.subscribe()
    }

    /// Clear the view without touching storage.
    ///
    /// The next send creates a new session.
    pub fn start_new_chat(&self) {
        {
            let mut view = self.inner.view.lock().unwrap();
            view.active = None;
            view.messages.clear();
        }
        tracing::debug!("Started new chat");
        self.publish();
    }

    /// Make `session_id` the displayed session and load its messages.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotFound`] for unknown ids, [`SessionError::Storage`]
    /// when the messages cannot be read. The view is unchanged in both cases.
    pub fn select_session(&self, session_id: &str) -> Result<Vec<Message>, SessionError> {
        let messages = {
            let mut view = self.inner.view.lock().unwrap();
            if !self.inner.registry.contains(session_id) {
                return Err(SessionError::NotFound(session_id.to_string()));
            }
            let messages = self.inner.sequences.load(session_id).inspect_err(|e| {
                tracing::error!(session_id = %session_id, error = %e, "Failed to read message sequence");
            })?;
            view.active = Some(session_id.to_string());
            view.messages.clone_from(&messages);
            messages
        };

        tracing::debug!(
            session_id = %session_id,
            message_count = messages.len(),
            "Selected session"
        );
        self.publish();
        Ok(messages)
    }

    /// Remove a session's registry entry and messages.
    ///
    /// Clears the view when the session was displayed. Unknown ids are a
    /// no-op.
    pub fn delete_session(&self, session_id: &str) -> DeleteOutcome {
        let mut outcome = DeleteOutcome::default();
        {
            // Held throughout so an in-flight reply cannot recreate the
            // record between the two removals.
            let mut view = self.inner.view.lock().unwrap();

            // Only registered ids own a message record; anything else may
            // name an unrelated key such as the registry itself.
            if !self.inner.registry.contains(session_id) {
                tracing::debug!(session_id = %session_id, "Ignoring delete of unknown session");
                return outcome;
            }

            if let Err(e) = self.inner.sequences.delete(session_id) {
                tracing::error!(session_id = %session_id, error = %e, "Failed to delete message sequence");
                outcome.storage_errors.push(e);
            }
            match self.inner.registry.remove(session_id) {
                Ok(existed) => outcome.existed = existed,
                Err(e) => {
                    tracing::error!(session_id = %session_id, error = %e, "Failed to persist session registry");
                    outcome.existed = true;
                    outcome.storage_errors.push(e);
                }
            }

            if view.active.as_deref() == Some(session_id) {
                view.active = None;
                view.messages.clear();
            }
        }

        tracing::info!(
            name: "session.deleted",
            session_id = %session_id,
            existed = outcome.existed,
            "Session deleted"
        );
        self.publish();
        outcome
    }

    /// Send `text` in the displayed session, creating one if none is active.
    ///
    /// Blank input is skipped without side effects. The user turn is
    /// persisted before the completion request is issued. Completion and
    /// storage failures are reported in the returned [`SendReport`].
    ///
    /// # Errors
    ///
    /// [`SessionError::Busy`] when the session already has a send in flight
    /// or another send is still creating a session,
    /// [`SessionError::NotFound`] when the displayed session was deleted
    /// concurrently.
    pub async fn send_message(&self, text: &str) -> Result<SendOutcome, SessionError> {
        if text.trim().is_empty() {
            tracing::debug!("Ignoring blank message");
            return Ok(SendOutcome::Skipped);
        }

        let mut storage_errors = Vec::new();

        let (session_id, created, _guard) = match self.claim_target()? {
            SendTarget::Existing(session_id) => {
                let guard = self.begin_send(&session_id)?;
                (session_id, None, guard)
            }
            SendTarget::New(session_id) => {
                let guard = self.begin_send(&session_id)?;
                let created = self
                    .create_session(&session_id, text, &mut storage_errors)
                    .await;
                (session_id, Some(created), guard)
            }
        };

        let user_message = Message::user(text);
        if !self.append_message(&session_id, user_message.clone(), &mut storage_errors) {
            return Err(SessionError::NotFound(session_id));
        }

        tracing::info!(
            name: "message.sent",
            session_id = %session_id,
            message_id = %user_message.id,
            "User message recorded"
        );

        let reply = self
            .request_reply(&session_id, text, &mut storage_errors)
            .await;

        Ok(SendOutcome::Sent(SendReport {
            session_id,
            created,
            user_message,
            reply,
            storage_errors,
        }))
    }

    /// Request a reply again for the displayed session's unanswered user turn.
    ///
    /// Skipped when no session is displayed or its last turn is not a user
    /// turn.
    ///
    /// # Errors
    ///
    /// [`SessionError::Busy`] when the session already has a send in flight.
    pub async fn retry_reply(&self) -> Result<SendOutcome, SessionError> {
        let Some(session_id) = self.active_session() else {
            return Ok(SendOutcome::Skipped);
        };
        let _guard = self.begin_send(&session_id)?;

        let pending = {
            let view = self.inner.view.lock().unwrap();
            if view.active.as_deref() == Some(session_id.as_str()) {
                view.messages
                    .last()
                    .filter(|m| m.role == MessageRole::User)
                    .cloned()
            } else {
                None
            }
        };
        let Some(user_message) = pending else {
            return Ok(SendOutcome::Skipped);
        };

        tracing::info!(
            name: "message.retry",
            session_id = %session_id,
            message_id = %user_message.id,
            "Retrying reply"
        );

        let mut storage_errors = Vec::new();
        let reply = self
            .request_reply(&session_id, &user_message.content, &mut storage_errors)
            .await;

        Ok(SendOutcome::Sent(SendReport {
            session_id,
            created: None,
            user_message,
            reply,
            storage_errors,
        }))
    }

    /// Infer a title, register the session and display it.
    async fn create_session(
        &self,
        session_id: &str,
        text: &str,
        storage_errors: &mut Vec<StorageError>,
    ) -> CreatedSession {
        let (name, title_error) = match self.inner.completion.complete(&title_prompt(text)).await {
            Ok(raw) => match clean_title(&raw) {
                Some(title) => (title, None),
                None => (self.inner.default_title.clone(), None),
            },
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    error = %e,
                    "Title inference failed, using default title"
                );
                (self.inner.default_title.clone(), Some(e))
            }
        };

        let meta = SessionMeta::new(session_id, name);
        if let Err(e) = self.inner.registry.add(meta.clone()) {
            tracing::error!(session_id = %session_id, error = %e, "Failed to persist session registry");
            storage_errors.push(e);
        }

        {
            let mut view = self.inner.view.lock().unwrap();
            if view.creating.as_deref() == Some(session_id) {
                view.creating = None;
            }
            // Leave the view alone if the user picked another session while
            // the title was being inferred.
            if view.active.is_none() {
                view.active = Some(session_id.to_string());
                view.messages.clear();
            }
        }

        tracing::info!(
            name: "session.created",
            session_id = %session_id,
            title = %meta.name,
            "Session created"
        );
        self.publish();

        CreatedSession { meta, title_error }
    }

    /// Ask for a reply to `prompt` and append it to `session_id`.
    async fn request_reply(
        &self,
        session_id: &str,
        prompt: &str,
        storage_errors: &mut Vec<StorageError>,
    ) -> ReplyOutcome {
        match self.inner.completion.complete(prompt).await {
            Ok(text) => {
                let reply = Message::assistant(text);
                if self.append_message(session_id, reply.clone(), storage_errors) {
                    tracing::info!(
                        name: "message.reply",
                        session_id = %session_id,
                        message_id = %reply.id,
                        "Assistant reply recorded"
                    );
                    ReplyOutcome::Received(reply)
                } else {
                    tracing::warn!(session_id = %session_id, "Session deleted before reply arrived");
                    ReplyOutcome::Discarded
                }
            }
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Completion request failed");
                ReplyOutcome::Failed(e)
            }
        }
    }

    /// Append `message` to `session_id` and persist the whole sequence.
    ///
    /// The view is updated only if `session_id` is displayed. Returns `false`
    /// without writing when the session is no longer registered. A stored
    /// sequence that cannot be read is never overwritten; the read error is
    /// reported instead.
    fn append_message(
        &self,
        session_id: &str,
        message: Message,
        storage_errors: &mut Vec<StorageError>,
    ) -> bool {
        {
            let mut view = self.inner.view.lock().unwrap();
            if !self.inner.registry.contains(session_id) {
                return false;
            }

            let messages = if view.active.as_deref() == Some(session_id) {
                view.messages.push(message);
                Some(view.messages.clone())
            } else {
                match self.inner.sequences.load(session_id) {
                    Ok(mut messages) => {
                        messages.push(message);
                        Some(messages)
                    }
                    Err(e) => {
                        tracing::error!(
                            session_id = %session_id,
                            error = %e,
                            "Message sequence unreadable, not appending"
                        );
                        storage_errors.push(e);
                        None
                    }
                }
            };

            if let Some(messages) = messages {
                if let Err(e) = self.inner.sequences.save(session_id, &messages) {
                    tracing::error!(session_id = %session_id, error = %e, "Failed to persist message sequence");
                    storage_errors.push(e);
                }
            }
        }

        self.publish();
        true
    }

    /// Pick the session a send lands in.
    ///
    /// With no session displayed, a fresh id is reserved so a concurrent send
    /// cannot start a second session while the first is being created.
    fn claim_target(&self) -> Result<SendTarget, SessionError> {
        let mut view = self.inner.view.lock().unwrap();
        if let Some(session_id) = &view.active {
            return Ok(SendTarget::Existing(session_id.clone()));
        }
        if let Some(pending) = &view.creating {
            tracing::warn!(session_id = %pending, "Rejected send while a session is being created");
            return Err(SessionError::Busy(pending.clone()));
        }

        let session_id = Uuid::new_v4().to_string();
        view.creating = Some(session_id.clone());
        Ok(SendTarget::New(session_id))
    }

    /// Claim the single-flight slot of `session_id`.
    fn begin_send(&self, session_id: &str) -> Result<InFlightGuard<'_>, SessionError> {
        let inserted = self
            .inner
            .in_flight
            .lock()
            .unwrap()
            .insert(session_id.to_string());
        if !inserted {
            tracing::warn!(session_id = %session_id, "Rejected overlapping send");
            return Err(SessionError::Busy(session_id.to_string()));
        }

        self.publish();
        Ok(InFlightGuard {
            store: self,
            session_id: session_id.to_string(),
        })
    }

    /// Push the current state to subscribers.
    fn publish(&self) {
        let (active_session, messages) = {
            let view = self.inner.view.lock().unwrap();
            (view.active.clone(), view.messages.clone())
        };
        let sessions = self.inner.registry.list();
        let mut in_flight: Vec<String> =
            self.inner.in_flight.lock().unwrap().iter().cloned().collect();
        in_flight.sort();

        self.inner.updates.send_replace(ViewSnapshot {
            active_session,
            messages,
            sessions,
            in_flight,
        });
    }
}
