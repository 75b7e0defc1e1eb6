//! Completion collaborator client.
//!
//! The session store only needs "send a prompt, get reply text or a failure".
//! [`CompletionClient`] is that contract; [`ChatCompletionsClient`] implements
//! it over the `OpenAI` Chat Completions API (`/v1/chat/completions`) and any
//! compatible provider.
//!
//! # Example
//!
//! ```rust,ignore
//! use multichat::llm::{ChatCompletionsClient, CompletionClient, LlmSettings, Provider};
//!
//! let settings = LlmSettings {
//!     base_url: "https://api.openai.com".to_string(),
//!     api_key: Some("sk-...".to_string()),
//!     model: "gpt-3.5-turbo".to_string(),
//!     provider: Provider::OpenAI,
//!     request_timeout: std::time::Duration::from_secs(60),
//! };
//! let client = ChatCompletionsClient::new(settings)?;
//! let reply = client.complete("Hello!").await?;
//! ```

pub mod chat_completions;
pub mod provider;

pub use chat_completions::ChatCompletionsClient;
pub use provider::Provider;

use std::time::Duration;

use crate::error::CompletionError;

/// LLM connection and model settings.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// Base URL for the LLM API (e.g., `https://api.openai.com`).
    pub base_url: String,
    /// Optional API key for authentication.
    pub api_key: Option<String>,
    /// Model identifier (e.g., `gpt-3.5-turbo`).
    pub model: String,
    /// Provider type (auto-detected from `base_url` if not specified).
    pub provider: Provider,
    /// Upper bound on a single request, connect to last byte.
    pub request_timeout: Duration,
}

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User message.
    User,
    /// Assistant response.
    Assistant,
}

/// A single request/response call to the completion collaborator.
#[async_trait::async_trait]
pub trait CompletionClient: Send + Sync + std::fmt::Debug {
    /// Send `prompt` as the sole user turn and return the full reply text.
    ///
    /// # Errors
    ///
    /// [`CompletionError::Transport`] when the call fails or the service
    /// answers with an error status, [`CompletionError::MalformedResponse`]
    /// when the reply text cannot be found in the response.
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}
