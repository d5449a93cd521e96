//! Owner identification extractor.
//!
//! Authentication happens upstream; by the time a request reaches this
//! service the caller's identity is carried in the `X-User-Id` header.
//! Every session and persona lookup is scoped to that owner.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::http::error::AppError;

pub const OWNER_HEADER: &str = "x-user-id";

/// The authenticated owner of the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner(pub String);

impl<S: Send + Sync> FromRequestParts<S> for Owner {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts.headers.get(OWNER_HEADER).ok_or_else(|| {
            AppError::Unauthorized("Missing owner. Provide it via the 'X-User-Id' header.".to_string())
        })?;
        let owner = value
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid X-User-Id header encoding".to_string()))?
            .trim();
        if owner.is_empty() {
            return Err(AppError::Unauthorized("X-User-Id header is empty".to_string()));
        }
        Ok(Owner(owner.to_string()))
    }
}
