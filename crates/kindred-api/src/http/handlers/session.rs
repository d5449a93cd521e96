//! Session HTTP handlers.
//!
//! Endpoints:
//! - GET    /api/v1/sessions                              - List the owner's sessions
//! - POST   /api/v1/sessions                              - Start an empty session
//! - GET    /api/v1/sessions/{id}                         - Session with messages (marks replies read)
//! - DELETE /api/v1/sessions/{id}                         - Delete a session
//! - GET    /api/v1/sessions/{id}/personality-suggestion  - Pending suggestion, if any
//! - POST   /api/v1/sessions/{id}/personality-suggestion  - Apply the pending suggestion
//! - DELETE /api/v1/sessions/{id}/personality-suggestion  - Dismiss the pending suggestion
//! - POST   /api/v1/sessions/{id}/proactive/ack           - Acknowledge proactive messages

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kindred_core::chat::reply::{SessionDetail, SessionListing};
use kindred_types::chat::ChatSession;
use kindred_types::decision::PersonalityDecision;
use kindred_types::persona::Persona;

use super::parse_uuid;
use crate::http::error::AppError;
use crate::http::extractors::owner::Owner;
use crate::http::extractors::query::SessionListQuery;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default, alias = "agent_id")]
    pub persona_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct AckRequest {
    pub message_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub acknowledged: usize,
}

#[derive(Debug, Serialize)]
pub struct SuggestionResponse {
    pub session_id: Uuid,
    pub suggestion: Option<PersonalityDecision>,
}

#[derive(Debug, Serialize)]
pub struct ApplySuggestionResponse {
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona: Option<Persona>,
}

/// GET /api/v1/sessions - List sessions, newest first.
pub async fn list_sessions(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Query(query): Query<SessionListQuery>,
) -> Result<Json<ApiResponse<Vec<SessionListing>>>, AppError> {
    let timer = RequestTimer::start();

    let sessions = state
        .chat_service
        .list_sessions(&owner, Some(query.limit), Some(query.offset))
        .await?;

    Ok(Json(timer.respond(sessions).with_link("self", "/api/v1/sessions")))
}

/// POST /api/v1/sessions - Start a session with no messages.
pub async fn create_session(
    State(state): State<AppState>,
    Owner(owner): Owner,
    body: Option<Json<CreateSessionRequest>>,
) -> Result<(StatusCode, Json<ApiResponse<ChatSession>>), AppError> {
    let timer = RequestTimer::start();
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let session = state.chat_service.create_session(&owner, body.persona_id).await?;

    let self_link = format!("/api/v1/sessions/{}", session.id);
    Ok((
        StatusCode::CREATED,
        Json(timer.respond(session).with_link("self", &self_link)),
    ))
}

/// GET /api/v1/sessions/{id} - Session with all its messages.
///
/// Opening a session marks its agent messages as read.
pub async fn get_session(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<SessionDetail>>, AppError> {
    let timer = RequestTimer::start();
    let sid = parse_uuid(&session_id)?;

    let detail = state.chat_service.open_session(&owner, sid).await?;

    Ok(Json(
        timer
            .respond(detail)
            .with_link("self", &format!("/api/v1/sessions/{sid}"))
            .with_link(
                "personality_suggestion",
                &format!("/api/v1/sessions/{sid}/personality-suggestion"),
            ),
    ))
}

/// DELETE /api/v1/sessions/{id} - Delete a session and its orphaned messages.
pub async fn delete_session(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let timer = RequestTimer::start();
    let sid = parse_uuid(&session_id)?;

    state.chat_service.delete_session(&owner, sid).await?;

    Ok(Json(timer.respond(serde_json::json!({"deleted": true}))))
}

/// GET /api/v1/sessions/{id}/personality-suggestion
pub async fn get_suggestion(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<SuggestionResponse>>, AppError> {
    let timer = RequestTimer::start();
    let sid = parse_uuid(&session_id)?;

    let suggestion = state.chat_service.personality_suggestion(&owner, sid).await?;

    Ok(Json(timer.respond(SuggestionResponse {
        session_id: sid,
        suggestion,
    })))
}

/// POST /api/v1/sessions/{id}/personality-suggestion - Apply as suggested.
pub async fn apply_suggestion(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<ApplySuggestionResponse>>, AppError> {
    let timer = RequestTimer::start();
    let sid = parse_uuid(&session_id)?;

    let persona = state
        .chat_service
        .apply_personality_suggestion(&owner, sid)
        .await?;

    Ok(Json(timer.respond(ApplySuggestionResponse {
        applied: persona.is_some(),
        persona,
    })))
}

/// DELETE /api/v1/sessions/{id}/personality-suggestion - Dismiss.
pub async fn dismiss_suggestion(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let timer = RequestTimer::start();
    let sid = parse_uuid(&session_id)?;

    let dismissed = state
        .chat_service
        .dismiss_personality_suggestion(&owner, sid)
        .await?;

    Ok(Json(timer.respond(serde_json::json!({"dismissed": dismissed}))))
}

/// POST /api/v1/sessions/{id}/proactive/ack - Mark proactive messages delivered.
pub async fn acknowledge_proactive(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(session_id): Path<String>,
    Json(body): Json<AckRequest>,
) -> Result<Json<ApiResponse<AckResponse>>, AppError> {
    let timer = RequestTimer::start();
    let sid = parse_uuid(&session_id)?;

    let acknowledged = state
        .chat_service
        .acknowledge_proactive_messages(&owner, sid, &body.message_ids)
        .await?;

    Ok(Json(timer.respond(AckResponse { acknowledged })))
}
