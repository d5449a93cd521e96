//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use kindred_types::error::{ChatError, RepositoryError};

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Orchestrator errors.
    Chat(ChatError),
    /// Missing or malformed owner identity.
    Unauthorized(String),
    /// Validation error.
    Validation(String),
}

impl From<ChatError> for AppError {
    fn from(e: ChatError) -> Self {
        AppError::Chat(e)
    }
}

impl AppError {
    /// HTTP status and machine-readable code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Chat(ChatError::PersonaNotFound) => (StatusCode::NOT_FOUND, "PERSONA_NOT_FOUND"),
            AppError::Chat(ChatError::SessionNotFound) => (StatusCode::NOT_FOUND, "SESSION_NOT_FOUND"),
            AppError::Chat(ChatError::InvalidInput(_)) | AppError::Validation(_) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
            }
            AppError::Chat(ChatError::Storage(RepositoryError::NotFound)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND")
            }
            AppError::Chat(ChatError::Storage(RepositoryError::Conflict(_))) => {
                (StatusCode::CONFLICT, "CONFLICT")
            }
            AppError::Chat(ChatError::Storage(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR")
            }
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Chat(ChatError::PersonaNotFound) => "Agent not found".to_string(),
            AppError::Chat(ChatError::SessionNotFound) => "Chat session not found".to_string(),
            AppError::Chat(ChatError::InvalidInput(msg)) => msg.clone(),
            AppError::Chat(e) => e.to_string(),
            AppError::Unauthorized(msg) | AppError::Validation(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(code, error = ?self, "Request failed");
        }

        let body = json!({
            "data": null,
            "meta": {
                "request_id": "",
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "response_time_ms": 0
            },
            "errors": [{
                "code": code,
                "message": self.message(),
            }]
        });

        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}
