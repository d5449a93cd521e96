//! HTTP/REST API layer for Kindred.
//!
//! Axum-based REST API at `/api/v1/` with owner identification via the
//! `X-User-Id` header, envelope response format, and CORS support.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod response;
pub mod router;
