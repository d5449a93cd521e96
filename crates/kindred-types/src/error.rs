use thiserror::Error;

/// Errors from repository operations (used by trait definitions in kindred-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors surfaced by the session orchestrator.
///
/// AI-path failures never appear here; they are absorbed into fallbacks.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("persona not found")]
    PersonaNotFound,

    #[error("session not found")]
    SessionNotFound,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage error: {0}")]
    Storage(#[from] RepositoryError),
}

impl ChatError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ChatError::PersonaNotFound | ChatError::SessionNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn test_chat_error_wraps_repository_error() {
        let err: ChatError = RepositoryError::Connection.into();
        assert_eq!(err.to_string(), "storage error: database connection error");
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_not_found_variants() {
        assert!(ChatError::PersonaNotFound.is_not_found());
        assert!(ChatError::SessionNotFound.is_not_found());
    }
}
