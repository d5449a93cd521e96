//! Agent (persona) HTTP handlers.
//!
//! Endpoints:
//! - GET    /api/v1/agents                  - List the owner's agents
//! - POST   /api/v1/agents                  - Create an agent
//! - GET    /api/v1/agents/{id}             - Get an agent
//! - PATCH  /api/v1/agents/{id}             - Edit model, timings, behavior, name
//! - DELETE /api/v1/agents/{id}             - Delete an agent and its sessions
//! - PUT    /api/v1/agents/{id}/personality - Overwrite the personality text

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;

use kindred_types::persona::{NewPersona, Persona, PersonaPatch};

use super::parse_uuid;
use crate::http::error::AppError;
use crate::http::extractors::owner::Owner;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdatePersonalityRequest {
    #[serde(alias = "personality")]
    pub personality_prompt: String,
}

/// GET /api/v1/agents
pub async fn list_agents(
    State(state): State<AppState>,
    Owner(owner): Owner,
) -> Result<Json<ApiResponse<Vec<Persona>>>, AppError> {
    let timer = RequestTimer::start();

    let personas = state.chat_service.list_personas(&owner).await?;

    Ok(Json(timer.respond(personas).with_link("self", "/api/v1/agents")))
}

/// POST /api/v1/agents
pub async fn create_agent(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Json(body): Json<NewPersona>,
) -> Result<(StatusCode, Json<ApiResponse<Persona>>), AppError> {
    let timer = RequestTimer::start();

    let persona = state.chat_service.create_persona(&owner, body).await?;

    let self_link = format!("/api/v1/agents/{}", persona.id);
    Ok((
        StatusCode::CREATED,
        Json(timer.respond(persona).with_link("self", &self_link)),
    ))
}

/// GET /api/v1/agents/{id}
pub async fn get_agent(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(agent_id): Path<String>,
) -> Result<Json<ApiResponse<Persona>>, AppError> {
    let timer = RequestTimer::start();
    let id = parse_uuid(&agent_id)?;

    let persona = state.chat_service.get_persona(&owner, id).await?;

    Ok(Json(timer.respond(persona).with_link("self", &format!("/api/v1/agents/{id}"))))
}

/// PATCH /api/v1/agents/{id}
///
/// Fields left out of the body keep their current value.
pub async fn patch_agent(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(agent_id): Path<String>,
    Json(body): Json<PersonaPatch>,
) -> Result<Json<ApiResponse<Persona>>, AppError> {
    let timer = RequestTimer::start();
    let id = parse_uuid(&agent_id)?;

    let persona = state.chat_service.update_persona(&owner, id, body).await?;

    Ok(Json(timer.respond(persona).with_link("self", &format!("/api/v1/agents/{id}"))))
}

/// DELETE /api/v1/agents/{id}
pub async fn delete_agent(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(agent_id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let timer = RequestTimer::start();
    let id = parse_uuid(&agent_id)?;

    state.chat_service.delete_persona(&owner, id).await?;

    Ok(Json(timer.respond(serde_json::json!({"deleted": true}))))
}

/// PUT /api/v1/agents/{id}/personality
pub async fn update_personality(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(agent_id): Path<String>,
    Json(body): Json<UpdatePersonalityRequest>,
) -> Result<Json<ApiResponse<Persona>>, AppError> {
    let timer = RequestTimer::start();
    let id = parse_uuid(&agent_id)?;

    let persona = state
        .chat_service
        .update_personality(&owner, id, body.personality_prompt)
        .await?;

    Ok(Json(timer.respond(persona)))
}
