//! HTTP request handlers

use super::types::{ChatRequest, ChatResponse, ErrorResponse, SessionListResponse};
use super::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/sessions", get(list_sessions))
        .route("/version", get(get_version))
        .with_state(state)
}

/// One conversation turn. A missing `session_id` starts a new conversation
/// under a freshly generated opaque identifier.
async fn chat(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Json<ChatResponse> {
    let session_id = req
        .session_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
    tracing::info!(session_id = %session_id, "chat message received");

    let reply = state.orchestrator.handle(&session_id, &req.message).await;

    Json(ChatResponse { session_id, reply })
}

/// Live session ids. Diagnostic only.
async fn list_sessions(
    State(state): State<AppState>,
) -> Result<Json<SessionListResponse>, AppError> {
    let sessions = state
        .sessions
        .list_ids()
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(SessionListResponse { sessions }))
}

async fn get_version() -> &'static str {
    concat!("clinic-chat ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

enum AppError {
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
