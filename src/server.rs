use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use tower_http::trace::TraceLayer;

use tracing::info;

use crate::AppState;
use crate::config::{AppConfig, StorageBackend};
use crate::error::{SessionError, StorageError};
use crate::llm::{ChatCompletionsClient, CompletionClient, LlmSettings};
use crate::session::{
    CreatedSession, Message, ReplyOutcome, SendOutcome, SessionMeta, SessionStore,
};
use crate::storage::{FileStore, KeyValueStore, MemoryStore};

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>, settings: LlmSettings) -> anyhow::Result<()> {
    info!(
        name: "llm.config.loaded",
        base_url = %settings.base_url,
        model = %settings.model,
        "LLM configuration loaded"
    );

    let kv: Arc<dyn KeyValueStore> = match config.storage.backend {
        StorageBackend::File => {
            let store = FileStore::open(&config.storage.data_dir)?;
            info!(
                name: "storage.opened",
                backend = "file",
                data_dir = %store.root().display(),
                "Storage opened"
            );
            Arc::new(store)
        }
        StorageBackend::Memory => {
            info!(name: "storage.opened", backend = "memory", "Storage opened");
            Arc::new(MemoryStore::new())
        }
    };

    let completion: Arc<dyn CompletionClient> = Arc::new(ChatCompletionsClient::new(settings)?);

    let sessions = SessionStore::with_default_title(
        kv,
        Arc::clone(&completion),
        config.chat.default_title.clone(),
    );
    info!(
        session_count = sessions.list_sessions().len(),
        "Session registry loaded"
    );

    let state = AppState {
        sessions,
        completion,
    };

    let app = router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

/// Build the API router over `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/sessions", get(api_list_sessions))
        .route("/api/sessions/new", post(api_new_chat))
        .route("/api/sessions/{id}/select", post(api_select_session))
        .route("/api/sessions/{id}", delete(api_delete_session))
        .route("/api/messages", get(api_active_messages))
        .route("/api/chat", post(api_chat))
        .route("/api/chat/retry", post(api_retry))
        .route("/api/complete", post(api_complete))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// API Types
// ─────────────────────────────────────────────────────────────────────────────

/// Request body carrying raw user text.
#[derive(Debug, Deserialize)]
struct MessageRequest {
    message: String,
}

/// Displayed conversation.
#[derive(Debug, Serialize)]
struct ViewResponse {
    active_session: Option<String>,
    messages: Vec<Message>,
}

impl ViewResponse {
    fn of(sessions: &SessionStore) -> Self {
        Self {
            active_session: sessions.active_session(),
            messages: sessions.active_messages(),
        }
    }
}

/// Error payload.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct CreatedResponse {
    session: SessionMeta,
    /// Why the default title was used.
    #[serde(skip_serializing_if = "Option::is_none")]
    title_error: Option<String>,
}

impl From<CreatedSession> for CreatedResponse {
    fn from(created: CreatedSession) -> Self {
        Self {
            session: created.meta,
            title_error: created.title_error.map(|e| e.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum ReplyResponse {
    Received { message: Message },
    Failed { kind: &'static str, error: String },
    Discarded,
}

impl From<ReplyOutcome> for ReplyResponse {
    fn from(reply: ReplyOutcome) -> Self {
        match reply {
            ReplyOutcome::Received(message) => Self::Received { message },
            ReplyOutcome::Failed(e) => Self::Failed {
                kind: e.kind(),
                error: e.to_string(),
            },
            ReplyOutcome::Discarded => Self::Discarded,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum SendResponse {
    Skipped,
    Sent {
        session_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        created: Option<CreatedResponse>,
        user_message: Message,
        reply: ReplyResponse,
        storage_errors: Vec<String>,
    },
}

impl From<SendOutcome> for SendResponse {
    fn from(outcome: SendOutcome) -> Self {
        match outcome {
            SendOutcome::Skipped => Self::Skipped,
            SendOutcome::Sent(report) => Self::Sent {
                session_id: report.session_id,
                created: report.created.map(Into::into),
                user_message: report.user_message,
                reply: report.reply.into(),
                storage_errors: error_strings(&report.storage_errors),
            },
        }
    }
}

/// Reply of the completion proxy.
#[derive(Debug, Serialize)]
struct CompleteResponse {
    reply: String,
}

fn error_strings(errors: &[StorageError]) -> Vec<String> {
    errors.iter().map(ToString::to_string).collect()
}

fn session_error(e: &SessionError) -> Response {
    let status = match e {
        SessionError::NotFound(_) => StatusCode::NOT_FOUND,
        SessionError::Busy(_) => StatusCode::CONFLICT,
        SessionError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    let body = ErrorResponse {
        error: e.to_string(),
        kind: matches!(e, SessionError::Storage(_)).then_some("storage_unavailable"),
    };
    (status, Json(body)).into_response()
}

// ─────────────────────────────────────────────────────────────────────────────
// API Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// GET /api/sessions - List all sessions.
async fn api_list_sessions(State(state): State<AppState>) -> Json<Vec<SessionMeta>> {
    Json(state.sessions.list_sessions())
}

/// POST /api/sessions/new - Clear the displayed conversation.
async fn api_new_chat(State(state): State<AppState>) -> Json<ViewResponse> {
    state.sessions.start_new_chat();
    Json(ViewResponse::of(&state.sessions))
}

/// POST /api/sessions/{id}/select - Display a session.
async fn api_select_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    match state.sessions.select_session(&id) {
        Ok(messages) => Json(ViewResponse {
            active_session: Some(id),
            messages,
        })
        .into_response(),
        Err(e) => session_error(&e),
    }
}

/// DELETE /api/sessions/{id} - Delete a session and its messages.
async fn api_delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let outcome = state.sessions.delete_session(&id);
    if outcome.storage_errors.is_empty() {
        StatusCode::NO_CONTENT.into_response()
    } else {
        let body = ErrorResponse {
            error: error_strings(&outcome.storage_errors).join("; "),
            kind: Some("storage_unavailable"),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

/// GET /api/messages - Displayed session and its messages.
async fn api_active_messages(State(state): State<AppState>) -> Json<ViewResponse> {
    Json(ViewResponse::of(&state.sessions))
}

/// POST /api/chat - Send a message in the displayed session.
async fn api_chat(State(state): State<AppState>, Json(req): Json<MessageRequest>) -> Response {
    tracing::info!(
        message_length = req.message.len(),
        active_session = ?state.sessions.active_session(),
        "Received chat request"
    );

    match state.sessions.send_message(&req.message).await {
        Ok(outcome) => Json(SendResponse::from(outcome)).into_response(),
        Err(e) => session_error(&e),
    }
}

/// POST /api/chat/retry - Retry the reply to the last unanswered message.
async fn api_retry(State(state): State<AppState>) -> Response {
    match state.sessions.retry_reply().await {
        Ok(outcome) => Json(SendResponse::from(outcome)).into_response(),
        Err(e) => session_error(&e),
    }
}

/// POST /api/complete - Forward one prompt to the completion service.
async fn api_complete(State(state): State<AppState>, Json(req): Json<MessageRequest>) -> Response {
    match state.completion.complete(&req.message).await {
        Ok(reply) => Json(CompleteResponse { reply }).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Completion proxy failed");
            let body = ErrorResponse {
                error: "Failed to fetch response".to_string(),
                kind: Some(e.kind()),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}
