//! Caller-visible result of one orchestrator call.
//!
//! Field names are a wire contract shared with the HTTP layer and clients.
//! False flags and absent values are omitted from the JSON.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kindred_types::chat::{ChatMessage, ChatSession};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyMessage {
    pub id: Uuid,
    pub message: String,
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub session_id: Uuid,
    pub user_message_id: Uuid,
    /// Text of the (first) assistant message.
    pub response: String,
    /// Id of the (first) assistant message.
    pub ai_message_id: Uuid,
    /// Present only for split replies, one entry per stored message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<ReplyMessage>>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub summary_updated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub personality_updated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personality_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub personality_suggestion_available: bool,
}

impl ChatReply {
    /// Build the reply skeleton from the stored assistant messages.
    ///
    /// `assistant` must not be empty.
    pub(crate) fn new(session_id: Uuid, user_message_id: Uuid, assistant: &[ReplyMessage]) -> Self {
        let (response, ai_message_id) = assistant
            .first()
            .map(|m| (m.message.clone(), m.id))
            .unwrap_or_default();
        Self {
            session_id,
            user_message_id,
            response,
            ai_message_id,
            messages: (assistant.len() > 1).then(|| assistant.to_vec()),
            summary_updated: false,
            summary: None,
            personality_updated: false,
            personality_prompt: None,
            personality_suggestion_available: false,
        }
    }

    pub fn is_split(&self) -> bool {
        self.messages.is_some()
    }
}

/// A session together with its messages, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: ChatSession,
    pub messages: Vec<ChatMessage>,
}

/// One entry of the session list.
///
/// `summary` falls back to the latest message text while no summary has
/// been written yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionListing {
    #[serde(flatten)]
    pub session: ChatSession,
    /// Name of the persona the session talks to.
    pub agent_name: Option<String>,
}
