//! Session and message store.
//!
//! This module owns every conversation the user has started: the catalog of
//! sessions, each session's ordered messages, the currently displayed
//! session, and the send cycle that talks to the completion service.
//!
//! # Architecture
//!
//! - [`SessionRegistry`]: id → name catalog, persisted as one record
//! - [`MessageSequence`]: per-session message lists, keyed by session id
//! - [`SessionStore`]: orchestrator exposing the operations a UI needs
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use multichat::session::SessionStore;
//! use multichat::storage::MemoryStore;
//!
//! let store = SessionStore::new(Arc::new(MemoryStore::new()), completion_client);
//! store.send_message("Hello!").await?;
//!
//! let messages = store.active_messages();
//! assert_eq!(messages.len(), 2);
//! ```

mod registry;
mod sequence;
mod store;
mod title;

pub use registry::{REGISTRY_KEY, SessionMeta, SessionRegistry};
pub use sequence::{Message, MessageSequence};
pub use store::{
    CreatedSession, DeleteOutcome, ReplyOutcome, SendOutcome, SendReport, SessionStore,
    ViewSnapshot,
};
pub use title::{DEFAULT_TITLE, TITLE_INSTRUCTION, clean_title, title_prompt};
