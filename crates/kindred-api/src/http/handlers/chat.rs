//! Chat HTTP handlers.
//!
//! Endpoints:
//! - POST /api/v1/chat          - Send a user message and get the agent's reply
//! - GET  /api/v1/chat/history  - Recent sessions with their messages

use axum::Json;
use axum::extract::{Query, State};

use kindred_core::chat::reply::{ChatReply, SessionDetail};
use kindred_core::chat::service::SendMessage;

use crate::http::error::AppError;
use crate::http::extractors::owner::Owner;
use crate::http::extractors::query::HistoryQuery;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

/// POST /api/v1/chat - Send a message.
///
/// Starts a new session when `session_id` is absent. The reply payload is
/// the envelope's `data` object.
pub async fn send_message(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Json(body): Json<SendMessage>,
) -> Result<Json<ApiResponse<ChatReply>>, AppError> {
    let timer = RequestTimer::start();

    let reply = state.chat_service.send_message(&owner, body).await?;

    let session_link = format!("/api/v1/sessions/{}", reply.session_id);
    Ok(Json(timer.respond(reply).with_link("session", &session_link)))
}

/// GET /api/v1/chat/history - Chat history, newest session first.
pub async fn chat_history(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ApiResponse<Vec<SessionDetail>>>, AppError> {
    let timer = RequestTimer::start();

    let history = state
        .chat_service
        .chat_history(&owner, query.session_id, query.limit)
        .await?;

    Ok(Json(timer.respond(history).with_link("self", "/api/v1/chat/history")))
}
