//! Typed scratch state carried on a chat session.
//!
//! Every field is optional: `None` means the value was never computed, which
//! is distinct from an empty value. The whole record is persisted as one JSON
//! column.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decision::{PersonalityDecision, ProactiveAction};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// When the personality analyzer last ran for this session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_personality_check: Option<DateTime<Utc>>,

    /// The single pending suggestion awaiting apply or dismiss.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personality_suggestion: Option<PersonalityDecision>,

    /// Record of the most recent automatically applied personality change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_personality_auto_update: Option<PersonalityAutoUpdate>,

    /// Proactive messages the client has not acknowledged yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proactive_messages: Option<Vec<ProactiveMessageRecord>>,
}

impl SessionState {
    pub fn has_personality_suggestion(&self) -> bool {
        self.personality_suggestion.is_some()
    }

    /// Append a pending proactive descriptor, creating the list on first use.
    pub fn push_proactive(&mut self, record: ProactiveMessageRecord) {
        self.proactive_messages.get_or_insert_with(Vec::new).push(record);
    }

    /// Drop the descriptors for the given message ids, returning how many were removed.
    /// An emptied list goes back to `None`.
    pub fn acknowledge_proactive(&mut self, message_ids: &[Uuid]) -> usize {
        let Some(pending) = self.proactive_messages.as_mut() else {
            return 0;
        };
        let before = pending.len();
        pending.retain(|record| !message_ids.contains(&record.message_id));
        let cleared = before - pending.len();
        if pending.is_empty() {
            self.proactive_messages = None;
        }
        cleared
    }
}

/// An automatically applied personality change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalityAutoUpdate {
    pub applied_at: DateTime<Utc>,
    pub personality: String,
    pub reason: String,
    pub confidence: f64,
}

/// A proactive message materialized by the sweeper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProactiveMessageRecord {
    pub message_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub action: ProactiveAction,
    pub reason: String,
}
