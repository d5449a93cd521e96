//! ChatRepository trait definition.
//!
//! Provides persistence for chat sessions and the messages attached to them.
//! Messages join sessions through membership, so a message may in principle
//! be attached to more than one session; read state lives on the message.

use kindred_types::chat::{ChatMessage, ChatSession};
use kindred_types::error::RepositoryError;
use uuid::Uuid;

/// Repository trait for chat session and message persistence.
///
/// Implementations live in kindred-infra (e.g., `SqliteChatRepository`).
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait ChatRepository: Send + Sync {
    /// Create a new chat session.
    fn create_session(
        &self,
        session: &ChatSession,
    ) -> impl std::future::Future<Output = Result<ChatSession, RepositoryError>> + Send;

    /// Get a session by id, scoped to its owner.
    fn get_session(
        &self,
        session_id: &Uuid,
        owner_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<ChatSession>, RepositoryError>> + Send;

    /// Get a session by id regardless of owner (background work only).
    fn get_session_by_id(
        &self,
        session_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<ChatSession>, RepositoryError>> + Send;

    /// Persist summary, message_count, last_activity_at, state and persona link.
    ///
    /// The write only lands if the stored revision still equals
    /// `session.revision`; the stored revision is then bumped. Returns false
    /// when another writer got there first, and `RepositoryError::NotFound`
    /// if the session does not exist.
    fn update_session(
        &self,
        session: &ChatSession,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Store an agent-initiated message together with the session update that
    /// records it, in one transaction.
    ///
    /// Nothing is written, and false is returned, unless all of these still
    /// hold when the transaction runs: the stored revision equals
    /// `session.revision`, the session has exactly `seen_messages` messages,
    /// and none of its agent messages are unread.
    fn commit_proactive_message(
        &self,
        session: &ChatSession,
        seen_messages: u32,
        message: &ChatMessage,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Delete a session, its memberships, and messages left without a session.
    ///
    /// Returns false if no session matched.
    fn delete_session(
        &self,
        session_id: &Uuid,
        owner_id: &str,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// List an owner's sessions, ordered by started_at DESC.
    fn list_sessions(
        &self,
        owner_id: &str,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> impl std::future::Future<Output = Result<Vec<ChatSession>, RepositoryError>> + Send;

    /// All sessions that have a recorded last_activity_at, across owners.
    fn list_sessions_with_activity(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<ChatSession>, RepositoryError>> + Send;

    /// Insert a message and attach it to a session.
    fn save_message(
        &self,
        session_id: &Uuid,
        message: &ChatMessage,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Attach an existing message to another session. Idempotent.
    fn attach_message(
        &self,
        session_id: &Uuid,
        message_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get messages for a session, ordered by created_at ASC.
    fn get_messages(
        &self,
        session_id: &Uuid,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, RepositoryError>> + Send;

    /// The last `count` messages of a session, returned in chronological order.
    fn get_recent_messages(
        &self,
        session_id: &Uuid,
        count: usize,
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, RepositoryError>> + Send;

    /// Mark every unread agent-authored message in the session as read.
    ///
    /// Returns the number of messages changed.
    fn mark_agent_messages_read(
        &self,
        session_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Mark specific messages of the session as read.
    fn mark_messages_read(
        &self,
        session_id: &Uuid,
        message_ids: &[Uuid],
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Count unread agent-authored messages attached to the session.
    fn count_unread_agent_messages(
        &self,
        session_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<u32, RepositoryError>> + Send;

    /// Live count of messages attached to the session.
    fn get_message_count(
        &self,
        session_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<u32, RepositoryError>> + Send;
}
