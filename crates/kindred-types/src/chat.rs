//! Chat session and message types for Kindred.
//!
//! A session is one continuous conversation between an owner and a persona.
//! Messages are attached to sessions through membership rather than
//! ownership, so a message carries no session id of its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

use crate::state::SessionState;

/// Who authored a message.
///
/// Maps to the CHECK constraint in the SQLite schema:
/// `CHECK (sender IN ('user', 'assistant', 'growth'))`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderKind {
    User,
    Assistant,
    /// System-generated message emitted by the inactivity sweeper.
    Growth,
}

impl SenderKind {
    /// Assistant replies and growth messages both count as agent-authored
    /// for read-state purposes.
    pub fn is_agent(self) -> bool {
        matches!(self, SenderKind::Assistant | SenderKind::Growth)
    }
}

impl fmt::Display for SenderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SenderKind::User => write!(f, "user"),
            SenderKind::Assistant => write!(f, "assistant"),
            SenderKind::Growth => write!(f, "growth"),
        }
    }
}

impl FromStr for SenderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(SenderKind::User),
            "assistant" => Ok(SenderKind::Assistant),
            "growth" => Ok(SenderKind::Growth),
            other => Err(format!("invalid sender kind: '{other}'")),
        }
    }
}

/// A single chat message.
///
/// Content is immutable once stored; only `is_read` changes afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub content: String,
    pub sender: SenderKind,
    pub is_read: bool,
    /// Opaque key-value metadata supplied by the emitter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub critical: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Build a new message stamped with a fresh v7 id.
    ///
    /// User messages start read; agent-authored messages start unread.
    pub fn new(sender: SenderKind, content: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            content: content.into(),
            sender,
            is_read: !sender.is_agent(),
            metadata: None,
            critical: false,
            critical_type: None,
            created_at,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A conversation thread between an owner and one of their personas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: Uuid,
    /// Opaque reference to the end user who owns the session.
    pub owner_id: String,
    pub persona_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Short running topic summary. Empty until the first summarization.
    pub summary: String,
    /// Denormalized count of attached messages. Always recomputed, never incremented.
    pub message_count: u32,
    /// Last genuine user activity. Never advanced by agent-authored messages.
    pub last_activity_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub state: SessionState,
    /// Bumped by every stored update. A write carrying an older revision is refused.
    #[serde(default)]
    pub revision: u64,
}

impl ChatSession {
    pub fn new(owner_id: impl Into<String>, persona_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            owner_id: owner_id.into(),
            persona_id,
            started_at,
            summary: String::new(),
            message_count: 0,
            last_activity_at: None,
            state: SessionState::default(),
            revision: 0,
        }
    }
}
