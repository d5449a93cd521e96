//! Query parameter extractors for list endpoints.

use serde::Deserialize;
use uuid::Uuid;

/// Query parameters for the session list endpoint.
#[derive(Debug, Deserialize)]
pub struct SessionListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Query parameters for chat history.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    /// Restrict to one session.
    pub session_id: Option<Uuid>,
    /// Maximum number of sessions, newest first (default 100).
    pub limit: Option<i64>,
}
