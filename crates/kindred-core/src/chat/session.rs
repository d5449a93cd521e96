//! Session manager for chat sessions.
//!
//! Wraps a `ChatSession` with the cadence rules (summaries every 10
//! messages, personality checks every 20) and the state transitions that
//! decisions cause. Persistence stays with the caller.

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use kindred_types::chat::ChatSession;
use kindred_types::decision::{PersonalityDecision, ProactiveDecision};
use kindred_types::persona::Persona;
use kindred_types::state::{PersonalityAutoUpdate, ProactiveMessageRecord};

use crate::agent::personality::PERSONALITY_MIN_MESSAGES;

/// Messages between summary refreshes.
pub const SUMMARY_INTERVAL: u32 = 10;

/// Messages between personality checks.
pub const PERSONALITY_INTERVAL: u32 = 20;

/// What applying a personality decision did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonalityOutcome {
    /// The persona's text was overwritten.
    AutoApplied,
    /// The decision was stored as the pending suggestion.
    Suggested,
    Unchanged,
}

/// Which derived fields the current turn rewrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnEdits {
    pub summary: bool,
    pub personality: bool,
}

pub struct SessionManager {
    session: ChatSession,
}

impl SessionManager {
    pub fn new(session: ChatSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut ChatSession {
        &mut self.session
    }

    pub fn into_session(self) -> ChatSession {
        self.session
    }

    /// Store the live message count read back from the store.
    pub fn set_message_count(&mut self, live_count: u32) {
        self.session.message_count = live_count;
    }

    /// Advance the activity clock. Only user-sent messages may call this.
    pub fn record_user_activity(&mut self, at: DateTime<Utc>) {
        self.session.last_activity_at = Some(at);
    }

    pub fn should_summarize(&self) -> bool {
        let count = self.session.message_count;
        count > 0 && count % SUMMARY_INTERVAL == 0
    }

    pub fn should_check_personality(&self) -> bool {
        let count = self.session.message_count;
        count >= PERSONALITY_MIN_MESSAGES && count % PERSONALITY_INTERVAL == 0
    }

    pub fn set_summary(&mut self, summary: String) {
        self.session.summary = summary;
    }

    /// Apply a personality decision from a per-message check.
    ///
    /// Above `auto_apply_confidence` a suggested text replaces the persona's
    /// prompt immediately. Otherwise a decision that wants an update becomes
    /// the single pending suggestion, replacing any earlier one.
    pub fn apply_personality_decision(
        &mut self,
        decision: PersonalityDecision,
        persona: &mut Persona,
        auto_apply_confidence: f64,
        now: DateTime<Utc>,
    ) -> PersonalityOutcome {
        let state = &mut self.session.state;
        state.last_personality_check = Some(now);

        if decision.should_update && decision.confidence > auto_apply_confidence {
            let Some(personality) = decision.suggested_personality else {
                return PersonalityOutcome::Unchanged;
            };
            persona.personality_prompt = personality.clone();
            persona.updated_at = now;
            state.personality_suggestion = None;
            state.last_personality_auto_update = Some(PersonalityAutoUpdate {
                applied_at: now,
                personality,
                reason: decision.reason,
                confidence: decision.confidence,
            });
            info!(
                session_id = %self.session.id,
                persona_id = %persona.id,
                confidence = decision.confidence,
                "Personality auto-applied"
            );
            return PersonalityOutcome::AutoApplied;
        }

        if decision.should_update {
            info!(
                session_id = %self.session.id,
                confidence = decision.confidence,
                "Personality suggestion stored"
            );
            state.personality_suggestion = Some(decision);
            return PersonalityOutcome::Suggested;
        }

        PersonalityOutcome::Unchanged
    }

    /// Record a background personality review. Never auto-applies.
    pub fn record_personality_review(
        &mut self,
        decision: PersonalityDecision,
        now: DateTime<Utc>,
    ) -> PersonalityOutcome {
        let state = &mut self.session.state;
        state.last_personality_check = Some(now);
        if decision.should_update {
            state.personality_suggestion = Some(decision);
            PersonalityOutcome::Suggested
        } else {
            PersonalityOutcome::Unchanged
        }
    }

    /// Apply the pending suggestion as-is and clear it.
    ///
    /// Returns false when there is nothing to apply; a suggestion without
    /// text is discarded.
    pub fn apply_pending_suggestion(&mut self, persona: &mut Persona, now: DateTime<Utc>) -> bool {
        let state = &mut self.session.state;
        let Some(suggestion) = state.personality_suggestion.take() else {
            return false;
        };
        let Some(personality) = suggestion.suggested_personality else {
            return false;
        };
        persona.personality_prompt = personality.clone();
        persona.updated_at = now;
        state.last_personality_auto_update = Some(PersonalityAutoUpdate {
            applied_at: now,
            personality,
            reason: suggestion.reason,
            confidence: suggestion.confidence,
        });
        true
    }

    /// Discard the pending suggestion. Returns whether one existed.
    pub fn dismiss_suggestion(&mut self) -> bool {
        self.session.state.personality_suggestion.take().is_some()
    }

    /// Move this turn's changes onto a newer stored copy of the session.
    ///
    /// Used after a write was refused because another writer bumped the
    /// revision. Fields the turn did not touch keep the stored values.
    pub fn rebase(&mut self, stored: ChatSession, live_count: u32, edits: TurnEdits) {
        let turn = std::mem::replace(&mut self.session, stored);
        let session = &mut self.session;
        session.persona_id = turn.persona_id;
        session.message_count = live_count;
        session.last_activity_at = session.last_activity_at.max(turn.last_activity_at);
        if edits.summary {
            session.summary = turn.summary;
        }
        if edits.personality {
            let state = &mut session.state;
            state.last_personality_check = turn.state.last_personality_check;
            state.personality_suggestion = turn.state.personality_suggestion;
            state.last_personality_auto_update = turn.state.last_personality_auto_update;
        }
    }

    /// Track a materialized proactive message until the client acknowledges it.
    pub fn record_proactive_message(
        &mut self,
        message_id: Uuid,
        created_at: DateTime<Utc>,
        decision: &ProactiveDecision,
    ) {
        self.session.state.push_proactive(ProactiveMessageRecord {
            message_id,
            created_at,
            action: decision.action,
            reason: decision.reason.clone(),
        });
    }
}
