//! HTTP API endpoints for a judgeloop session.
//!
//! Front ends drive the session through these routes and follow its progress
//! on the `/ws` event stream. Long-running work (compiling, regenerating) is
//! accepted with `202` and reported through events.
//!
//! # Endpoints
//!
//! - `GET /api/session` - Current session snapshot
//! - `GET /api/languages` - Language catalog
//! - `PUT /api/session/code` - Replace the code buffer
//! - `PUT /api/session/language` - Select a language by id
//! - `PUT /api/session/theme` - Select an editor theme
//! - `POST /api/compile` - Start a compile chain
//! - `POST /api/regenerate` - Ask the AI backend to fix the last failure
//! - `GET /api/chat` - Chat transcript
//! - `POST /api/chat` - Start a fresh conversation
//! - `POST /api/chat/message` - Send user text to the conversation
//! - `DELETE /api/chat` - End the conversation
//! - `GET /ws` - Session event stream
//!
//! # Example
//!
//! ```no_run
//! use judgeloop_orchestrator::{create_router, AppState, Config, Session};
//!
//! # async fn example() {
//! let config = Config::default();
//! let session = Session::from_config(&config).unwrap();
//! let router = create_router(AppState::new(session));
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await.unwrap();
//! axum::serve(listener, router).await.unwrap();
//! # }
//! ```

use std::sync::Arc;

use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::chat::ChatMessage;
use crate::error::JudgeLoopError;
use crate::events::ws_handler;
use crate::language::{Language, Theme};
use crate::session::Session;
use crate::session_state::SessionSnapshot;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for `PUT /api/session/code`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeRequest {
    /// New contents of the code buffer.
    pub code: String,
}

/// Request body for `PUT /api/session/language`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageRequest {
    /// Judge language id.
    pub id: u32,
}

/// Request body for `POST /api/chat/message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageRequest {
    /// What the user typed.
    pub text: String,
}

/// Response body for accepted background work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedResponse {
    /// Always `true`; progress follows on the event stream.
    pub accepted: bool,
}

/// Response body carrying a chat transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptResponse {
    /// Transcript lines, oldest first.
    pub messages: Vec<ChatMessage>,
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The session driven by this server.
    pub session: Session,
}

impl AppState {
    /// Creates a new `AppState`.
    #[must_use]
    pub const fn new(session: Session) -> Self {
        Self { session }
    }
}

impl FromRef<Arc<AppState>> for Session {
    fn from_ref(state: &Arc<AppState>) -> Self {
        state.session.clone()
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Internal error type for API handlers.
#[derive(Debug)]
enum ApiError {
    /// The request cannot be served as sent.
    BadRequest(String),
    /// The session is not in a state that accepts this request.
    Conflict(String),
    /// A remote backend failed.
    Upstream(String),
    /// Anything else.
    Internal(String),
}

impl From<JudgeLoopError> for ApiError {
    fn from(err: JudgeLoopError) -> Self {
        let message = err.to_string();
        match err {
            JudgeLoopError::EmptySource | JudgeLoopError::UnknownLanguage { .. } => {
                Self::BadRequest(message)
            }
            JudgeLoopError::NothingToRegenerate
            | JudgeLoopError::AlreadyRunning { .. }
            | JudgeLoopError::InvalidStateTransition { .. } => Self::Conflict(message),
            JudgeLoopError::Transport { .. }
            | JudgeLoopError::QuotaExceeded
            | JudgeLoopError::MalformedAiResponse { .. } => Self::Upstream(message),
            _ => Self::Internal(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all API endpoints.
///
/// The router carries:
/// - All API routes under `/api`
/// - The session event stream at `/ws`
/// - CORS middleware for browser front ends
/// - Tracing middleware for request logging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/session", get(handle_session))
        .route("/session/code", put(handle_set_code))
        .route("/session/language", put(handle_set_language))
        .route("/session/theme", put(handle_set_theme))
        .route("/languages", get(handle_languages))
        .route("/compile", post(handle_compile))
        .route("/regenerate", post(handle_regenerate))
        .route(
            "/chat",
            get(handle_chat_transcript)
                .post(handle_chat_start)
                .delete(handle_chat_end),
        )
        .route("/chat/message", post(handle_chat_message));

    Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Handlers
// ============================================================================

/// Handler for `GET /api/session`.
async fn handle_session(State(state): State<Arc<AppState>>) -> Json<SessionSnapshot> {
    Json(state.session.snapshot().await)
}

/// Handler for `GET /api/languages`.
async fn handle_languages(State(state): State<Arc<AppState>>) -> Json<Vec<Language>> {
    Json(state.session.catalog().languages().to_vec())
}

/// Handler for `PUT /api/session/code`.
async fn handle_set_code(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CodeRequest>,
) -> StatusCode {
    state.session.set_code(request.code).await;
    StatusCode::NO_CONTENT
}

/// Handler for `PUT /api/session/language`.
async fn handle_set_language(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LanguageRequest>,
) -> Result<Json<Language>, ApiError> {
    let language = state.session.select_language(request.id).await?;
    Ok(Json(language))
}

/// Handler for `PUT /api/session/theme`.
async fn handle_set_theme(
    State(state): State<Arc<AppState>>,
    Json(theme): Json<Theme>,
) -> StatusCode {
    state.session.set_theme(theme).await;
    StatusCode::NO_CONTENT
}

/// Handler for `POST /api/compile`.
///
/// The result arrives as `output_updated` and `notification` events.
async fn handle_compile(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    state.session.compile().await.map_err(|e| {
        warn!(error = %e, "Compile request rejected");
        ApiError::from(e)
    })?;
    info!("Compile accepted");
    Ok((StatusCode::ACCEPTED, Json(AcceptedResponse { accepted: true })))
}

/// Handler for `POST /api/regenerate`.
///
/// The result arrives as `code_replaced` and `notification` events.
async fn handle_regenerate(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    state.session.regenerate().await.map_err(|e| {
        warn!(error = %e, "Regenerate request rejected");
        ApiError::from(e)
    })?;
    info!("Regeneration accepted");
    Ok((StatusCode::ACCEPTED, Json(AcceptedResponse { accepted: true })))
}

/// Handler for `GET /api/chat`.
async fn handle_chat_transcript(State(state): State<Arc<AppState>>) -> Json<TranscriptResponse> {
    Json(TranscriptResponse {
        messages: state.session.chat_transcript().await,
    })
}

/// Handler for `POST /api/chat`.
async fn handle_chat_start(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TranscriptResponse>, ApiError> {
    let messages = state.session.start_chat().await?;
    Ok(Json(TranscriptResponse { messages }))
}

/// Handler for `POST /api/chat/message`.
///
/// Resolves once the assistant answered and the follow-up was shown.
async fn handle_chat_message(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatMessageRequest>,
) -> Result<Json<TranscriptResponse>, ApiError> {
    let messages = state.session.send_chat_message(request.text).await?;
    Ok(Json(TranscriptResponse { messages }))
}

/// Handler for `DELETE /api/chat`.
async fn handle_chat_end(State(state): State<Arc<AppState>>) -> StatusCode {
    state.session.end_chat().await;
    StatusCode::NO_CONTENT
}

// ============================================================================
// Tests
// ============================================================================
