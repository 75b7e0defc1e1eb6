//! Multichat
//!
//! A multi-session chat manager: keeps several independent conversations,
//! persists each one's history across restarts, and drives the
//! request/response cycle with a remote completion service.
//!
//! # Architecture
//!
//! - **Storage**: synchronous key-value adapter over memory or a data directory
//! - **Sessions**: registry, per-session message sequences and the orchestrating store
//! - **LLM**: single-shot client for `OpenAI`-compatible Chat Completions
//! - **Server**: Axum JSON API exposing the session operations
//!
//! # Modules
//!
//! - [`config`]: layered CLI / env / file configuration
//! - [`error`]: error taxonomy
//! - [`llm`]: completion client trait and implementation
//! - [`session`]: session and message management
//! - [`storage`]: key-value storage media

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod config;
pub mod error;
pub mod llm;
pub mod server;
pub mod session;
pub mod storage;

use llm::CompletionClient;
use session::SessionStore;
use std::sync::Arc;

/// Application state shared across all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Session store for conversation management.
    pub sessions: SessionStore,
    /// Completion client, shared with the session store.
    pub completion: Arc<dyn CompletionClient>,
}
