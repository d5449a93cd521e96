//! Chat service orchestrating sessions, personas, and the decision engine.
//!
//! `ChatService::send_message` is the synchronous entry point invoked for
//! every user message. It stores the message, generates the reply, keeps the
//! session's counters consistent, and runs the summary and personality
//! checks when their cadence comes up. AI-path failures never surface here:
//! the only errors are not-found, invalid input, and storage failures.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use kindred_types::chat::{ChatMessage, ChatSession, SenderKind};
use kindred_types::config::EngineSettings;
use kindred_types::decision::PersonalityDecision;
use kindred_types::error::{ChatError, RepositoryError};
use kindred_types::persona::{NewPersona, Persona, PersonaPatch};

use crate::agent::personality::{PERSONALITY_WINDOW, PersonalityAnalyzer, PersonalityInput};
use crate::agent::proactive::ProactiveEngine;
use crate::agent::responder::ResponseGenerator;
use crate::agent::summarizer::Summarizer;
use crate::clock::{Clock, SystemClock};
use crate::llm::client::LlmClient;
use crate::repository::persona::PersonaRepository;

use super::locks::SessionLocks;
use super::reply::{ChatReply, ReplyMessage, SessionDetail, SessionListing};
use super::repository::ChatRepository;
use super::session::{PersonalityOutcome, SessionManager, TurnEdits};

/// Default number of sessions returned by chat history.
pub const DEFAULT_HISTORY_LIMIT: i64 = 100;

/// Attempts at a session write before giving up on a busy session.
const MAX_WRITE_ATTEMPTS: usize = 5;

fn write_conflict(session_id: Uuid) -> ChatError {
    ChatError::Storage(RepositoryError::Conflict(format!(
        "session {session_id} kept changing underneath the write"
    )))
}

/// An inbound user message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessage {
    pub message: String,
    /// Continue this session; a new one is started when absent.
    #[serde(default)]
    pub session_id: Option<Uuid>,
    /// Talk to this persona; the owner's default persona is used when absent.
    #[serde(default, alias = "agent_id")]
    pub persona_id: Option<Uuid>,
}

/// Orchestrates sessions, personas, and the decision components.
///
/// Generic over `ChatRepository` and `PersonaRepository` to maintain
/// clean architecture (kindred-core never depends on kindred-infra).
pub struct ChatService<C: ChatRepository, P: PersonaRepository> {
    chat_repo: C,
    persona_repo: P,
    responder: ResponseGenerator,
    summarizer: Summarizer,
    analyzer: PersonalityAnalyzer,
    proactive: ProactiveEngine,
    locks: SessionLocks,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
    default_model: String,
}

impl<C: ChatRepository, P: PersonaRepository> ChatService<C, P> {
    pub fn new(
        chat_repo: C,
        persona_repo: P,
        llm: LlmClient,
        settings: EngineSettings,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            chat_repo,
            persona_repo,
            responder: ResponseGenerator::new(llm.clone(), settings.history_window),
            summarizer: Summarizer::new(llm.clone()),
            analyzer: PersonalityAnalyzer::new(llm.clone()),
            proactive: ProactiveEngine::new(llm),
            locks: SessionLocks::new(),
            clock: Arc::new(SystemClock),
            settings,
            default_model: default_model.into(),
        }
    }

    /// Replace the time source (tests pin time with a manual clock).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn chat_repo(&self) -> &C {
        &self.chat_repo
    }

    pub fn persona_repo(&self) -> &P {
        &self.persona_repo
    }

    pub(crate) fn locks(&self) -> &SessionLocks {
        &self.locks
    }

    pub(crate) fn analyzer(&self) -> &PersonalityAnalyzer {
        &self.analyzer
    }

    pub(crate) fn proactive(&self) -> &ProactiveEngine {
        &self.proactive
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // --- Per-message orchestration ---

    /// Handle one user message end to end.
    #[tracing::instrument(
        name = "send_message",
        skip(self, request),
        fields(owner_id = %owner_id, session_id = ?request.session_id)
    )]
    pub async fn send_message(
        &self,
        owner_id: &str,
        request: SendMessage,
    ) -> Result<ChatReply, ChatError> {
        let text = request.message.trim();
        if text.is_empty() {
            return Err(ChatError::InvalidInput("message must not be empty".to_string()));
        }

        let session = match request.session_id {
            Some(session_id) => self
                .chat_repo
                .get_session(&session_id, owner_id)
                .await?
                .ok_or(ChatError::SessionNotFound)?,
            None => {
                let persona = self.resolve_persona(owner_id, request.persona_id).await?;
                let session = ChatSession::new(owner_id, persona.id, self.now());
                info!(session_id = %session.id, persona_id = %persona.id, "Session started");
                self.chat_repo.create_session(&session).await?
            }
        };

        let _guard = self.locks.acquire(session.id).await;
        // Re-read under the lock so a concurrent sweep's writes are not lost.
        let session = self
            .chat_repo
            .get_session(&session.id, owner_id)
            .await?
            .ok_or(ChatError::SessionNotFound)?;

        let mut persona = match request.persona_id {
            Some(persona_id) => self
                .persona_repo
                .get_persona(&persona_id, owner_id)
                .await?
                .ok_or(ChatError::PersonaNotFound)?,
            None => self
                .persona_repo
                .get_persona_by_id(&session.persona_id)
                .await?
                .ok_or(ChatError::PersonaNotFound)?,
        };

        let mut manager = SessionManager::new(session);
        if manager.session().persona_id != persona.id {
            manager.session_mut().persona_id = persona.id;
        }
        let session_id = manager.session().id;

        let marked = self.chat_repo.mark_agent_messages_read(&session_id).await?;
        if marked > 0 {
            debug!(%session_id, marked, "Marked earlier replies as read");
        }

        let history = self
            .chat_repo
            .get_recent_messages(&session_id, self.responder.history_window())
            .await?;

        let mut stamps = Timestamps::new(self.now());
        let user_message = ChatMessage::new(SenderKind::User, text, stamps.next());
        self.chat_repo.save_message(&session_id, &user_message).await?;

        let reply = self.responder.generate(text, &persona, &history).await;

        let mut stored = Vec::new();
        for part in reply.into_parts() {
            let message = ChatMessage::new(SenderKind::Assistant, part, stamps.next());
            self.chat_repo.save_message(&session_id, &message).await?;
            stored.push(ReplyMessage {
                id: message.id,
                message: message.content,
            });
        }

        let now = self.now();
        manager.set_message_count(self.chat_repo.get_message_count(&session_id).await?);
        manager.record_user_activity(now);

        let mut payload = ChatReply::new(session_id, user_message.id, &stored);
        let mut edits = TurnEdits::default();

        if manager.should_summarize() {
            let messages = self.chat_repo.get_messages(&session_id, None, None).await?;
            let summary = self
                .summarizer
                .summarize(&persona.model, &messages, &manager.session().summary)
                .await;
            info!(%session_id, message_count = manager.session().message_count, "Summary refreshed");
            manager.set_summary(summary.clone());
            edits.summary = true;
            payload.summary_updated = true;
            payload.summary = Some(summary);
        }

        let mut auto_applied = false;
        if manager.should_check_personality() {
            edits.personality = true;
            let recent = self
                .chat_repo
                .get_recent_messages(&session_id, PERSONALITY_WINDOW)
                .await?;
            let session = manager.session();
            let decision = self
                .analyzer
                .analyze(PersonalityInput {
                    model: &persona.model,
                    message_count: session.message_count,
                    current_personality: &persona.personality_prompt,
                    summary: &session.summary,
                    recent: &recent,
                })
                .await;
            match manager.apply_personality_decision(
                decision,
                &mut persona,
                self.settings.auto_apply_confidence,
                now,
            ) {
                PersonalityOutcome::AutoApplied => {
                    auto_applied = true;
                    payload.personality_updated = true;
                    payload.personality_prompt = Some(persona.personality_prompt.clone());
                }
                PersonalityOutcome::Suggested => payload.personality_suggestion_available = true,
                PersonalityOutcome::Unchanged => {}
            }
        }

        let mut attempts = 1;
        while !self.chat_repo.update_session(manager.session()).await? {
            if attempts == MAX_WRITE_ATTEMPTS {
                return Err(write_conflict(session_id));
            }
            attempts += 1;
            debug!(%session_id, attempts, "Session changed by another writer, rebasing");
            let stored = self.require_session(owner_id, session_id).await?;
            let live_count = self.chat_repo.get_message_count(&session_id).await?;
            manager.rebase(stored, live_count, edits);
        }

        // Only the writer whose session update landed applies the persona change.
        if auto_applied {
            self.persona_repo.update_persona(&persona).await?;
        }
        Ok(payload)
    }

    /// Read-modify-write a session, retrying when another writer moved it on.
    ///
    /// `edit` returns its result and whether the session needs writing.
    async fn modify_session<T>(
        &self,
        owner_id: &str,
        session_id: Uuid,
        mut edit: impl FnMut(&mut SessionManager) -> (T, bool),
    ) -> Result<T, ChatError> {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let mut manager = SessionManager::new(self.require_session(owner_id, session_id).await?);
            let (value, changed) = edit(&mut manager);
            if !changed || self.chat_repo.update_session(manager.session()).await? {
                return Ok(value);
            }
            debug!(%session_id, "Session changed by another writer, retrying");
        }
        Err(write_conflict(session_id))
    }

    async fn resolve_persona(
        &self,
        owner_id: &str,
        persona_id: Option<Uuid>,
    ) -> Result<Persona, ChatError> {
        match persona_id {
            Some(id) => self
                .persona_repo
                .get_persona(&id, owner_id)
                .await?
                .ok_or(ChatError::PersonaNotFound),
            None => Ok(self.ensure_default_persona(owner_id).await?),
        }
    }

    /// Get or create the owner's "default" persona.
    pub async fn ensure_default_persona(&self, owner_id: &str) -> Result<Persona, ChatError> {
        let defaults = NewPersona::default_for(self.default_model.clone());
        Ok(self
            .persona_repo
            .ensure_persona(owner_id, &defaults, self.now())
            .await?)
    }

    // --- Sessions ---

    /// Start an empty session without sending a message.
    pub async fn create_session(
        &self,
        owner_id: &str,
        persona_id: Option<Uuid>,
    ) -> Result<ChatSession, ChatError> {
        let persona = self.resolve_persona(owner_id, persona_id).await?;
        let session = ChatSession::new(owner_id, persona.id, self.now());
        Ok(self.chat_repo.create_session(&session).await?)
    }

    /// Fetch a session with its messages, marking agent messages as read.
    pub async fn open_session(
        &self,
        owner_id: &str,
        session_id: Uuid,
    ) -> Result<SessionDetail, ChatError> {
        let _guard = self.locks.acquire(session_id).await;
        let session = self.require_session(owner_id, session_id).await?;
        self.chat_repo.mark_agent_messages_read(&session_id).await?;
        let messages = self.chat_repo.get_messages(&session_id, None, None).await?;
        Ok(SessionDetail { session, messages })
    }

    /// The owner's sessions, newest first, with the persona name attached.
    pub async fn list_sessions(
        &self,
        owner_id: &str,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<SessionListing>, ChatError> {
        let sessions = self.chat_repo.list_sessions(owner_id, limit, offset).await?;
        let mut names: HashMap<Uuid, Option<String>> = HashMap::new();
        let mut listings = Vec::with_capacity(sessions.len());
        for mut session in sessions {
            if session.summary.is_empty() {
                let latest = self.chat_repo.get_recent_messages(&session.id, 1).await?;
                if let Some(message) = latest.into_iter().next() {
                    session.summary = message.content;
                }
            }
            let agent_name = match names.get(&session.persona_id) {
                Some(name) => name.clone(),
                None => {
                    let name = self
                        .persona_repo
                        .get_persona(&session.persona_id, owner_id)
                        .await?
                        .map(|p| p.name);
                    names.insert(session.persona_id, name.clone());
                    name
                }
            };
            listings.push(SessionListing { session, agent_name });
        }
        Ok(listings)
    }

    pub async fn delete_session(&self, owner_id: &str, session_id: Uuid) -> Result<(), ChatError> {
        let _guard = self.locks.acquire(session_id).await;
        if !self.chat_repo.delete_session(&session_id, owner_id).await? {
            return Err(ChatError::SessionNotFound);
        }
        info!(%session_id, "Session deleted");
        Ok(())
    }

    /// Up to `limit` sessions, newest first, each with all of its messages.
    ///
    /// An unknown `session_id` yields an empty list. Does not change read state.
    pub async fn chat_history(
        &self,
        owner_id: &str,
        session_id: Option<Uuid>,
        limit: Option<i64>,
    ) -> Result<Vec<SessionDetail>, ChatError> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).max(1);
        let sessions = match session_id {
            Some(id) => self.chat_repo.get_session(&id, owner_id).await?.into_iter().collect(),
            None => self.chat_repo.list_sessions(owner_id, Some(limit), None).await?,
        };
        let mut details = Vec::with_capacity(sessions.len());
        for session in sessions {
            let messages = self.chat_repo.get_messages(&session.id, None, None).await?;
            details.push(SessionDetail { session, messages });
        }
        Ok(details)
    }

    async fn require_session(&self, owner_id: &str, session_id: Uuid) -> Result<ChatSession, ChatError> {
        self.chat_repo
            .get_session(&session_id, owner_id)
            .await?
            .ok_or(ChatError::SessionNotFound)
    }

    // --- Personality suggestions ---

    pub async fn personality_suggestion(
        &self,
        owner_id: &str,
        session_id: Uuid,
    ) -> Result<Option<PersonalityDecision>, ChatError> {
        let session = self.require_session(owner_id, session_id).await?;
        Ok(session.state.personality_suggestion)
    }

    /// Apply the pending suggestion to the session's persona.
    ///
    /// Returns the updated persona, or `None` when nothing was pending.
    pub async fn apply_personality_suggestion(
        &self,
        owner_id: &str,
        session_id: Uuid,
    ) -> Result<Option<Persona>, ChatError> {
        let _guard = self.locks.acquire(session_id).await;
        let session = self.require_session(owner_id, session_id).await?;
        if !session.state.has_personality_suggestion() {
            return Ok(None);
        }
        let persona = self
            .persona_repo
            .get_persona(&session.persona_id, owner_id)
            .await?
            .ok_or(ChatError::PersonaNotFound)?;

        let now = self.now();
        let applied = self
            .modify_session(owner_id, session_id, |manager| {
                if manager.session().persona_id != persona.id {
                    return (None, false);
                }
                let mut updated = persona.clone();
                let applied = manager.apply_pending_suggestion(&mut updated, now);
                // A text-less suggestion is still cleared from the session.
                let cleared = applied || !manager.session().state.has_personality_suggestion();
                (applied.then_some(updated), cleared)
            })
            .await?;

        if let Some(persona) = &applied {
            self.persona_repo.update_persona(persona).await?;
            info!(%session_id, persona_id = %persona.id, "Personality suggestion applied");
        }
        Ok(applied)
    }

    /// Discard the pending suggestion. Returns whether one existed.
    pub async fn dismiss_personality_suggestion(
        &self,
        owner_id: &str,
        session_id: Uuid,
    ) -> Result<bool, ChatError> {
        let _guard = self.locks.acquire(session_id).await;
        let dismissed = self
            .modify_session(owner_id, session_id, |manager| {
                let dismissed = manager.dismiss_suggestion();
                (dismissed, dismissed)
            })
            .await?;
        if dismissed {
            info!(%session_id, "Personality suggestion dismissed");
        }
        Ok(dismissed)
    }

    // --- Proactive messages ---

    /// Acknowledge delivered proactive messages, marking them read.
    ///
    /// Returns how many pending descriptors were cleared.
    pub async fn acknowledge_proactive_messages(
        &self,
        owner_id: &str,
        session_id: Uuid,
        message_ids: &[Uuid],
    ) -> Result<usize, ChatError> {
        let _guard = self.locks.acquire(session_id).await;
        self.require_session(owner_id, session_id).await?;
        self.chat_repo.mark_messages_read(&session_id, message_ids).await?;
        self.modify_session(owner_id, session_id, |manager| {
            let cleared = manager.session_mut().state.acknowledge_proactive(message_ids);
            (cleared, cleared > 0)
        })
        .await
    }

    // --- Personas ---

    pub async fn create_persona(&self, owner_id: &str, new: NewPersona) -> Result<Persona, ChatError> {
        if new.name.trim().is_empty() {
            return Err(ChatError::InvalidInput("persona name must not be empty".to_string()));
        }
        let persona = new.into_persona(owner_id, self.now());
        Ok(self.persona_repo.create_persona(&persona).await?)
    }

    pub async fn list_personas(&self, owner_id: &str) -> Result<Vec<Persona>, ChatError> {
        Ok(self.persona_repo.list_personas(owner_id).await?)
    }

    pub async fn get_persona(&self, owner_id: &str, persona_id: Uuid) -> Result<Persona, ChatError> {
        self.persona_repo
            .get_persona(&persona_id, owner_id)
            .await?
            .ok_or(ChatError::PersonaNotFound)
    }

    /// Overwrite a persona's personality text.
    pub async fn update_personality(
        &self,
        owner_id: &str,
        persona_id: Uuid,
        personality_prompt: String,
    ) -> Result<Persona, ChatError> {
        let mut persona = self.get_persona(owner_id, persona_id).await?;
        persona.personality_prompt = personality_prompt;
        persona.updated_at = self.now();
        self.persona_repo.update_persona(&persona).await?;
        info!(%persona_id, "Personality updated");
        Ok(persona)
    }

    /// Edit a persona's settings. Absent fields keep their value.
    pub async fn update_persona(
        &self,
        owner_id: &str,
        persona_id: Uuid,
        patch: PersonaPatch,
    ) -> Result<Persona, ChatError> {
        if patch.is_empty() {
            return Err(ChatError::InvalidInput("no persona fields to update".to_string()));
        }
        if patch.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
            return Err(ChatError::InvalidInput("persona name must not be empty".to_string()));
        }
        if patch.model.as_deref().is_some_and(|model| model.trim().is_empty()) {
            return Err(ChatError::InvalidInput("model must not be empty".to_string()));
        }
        if patch
            .timings
            .as_ref()
            .and_then(|t| t.inactivity_threshold_minutes)
            .is_some_and(|minutes| minutes == 0)
        {
            return Err(ChatError::InvalidInput(
                "inactivity threshold must be at least one minute".to_string(),
            ));
        }

        let mut persona = self.get_persona(owner_id, persona_id).await?;
        patch.apply(&mut persona, self.now());
        self.persona_repo.update_persona(&persona).await?;
        info!(%persona_id, "Persona updated");
        Ok(persona)
    }

    pub async fn delete_persona(&self, owner_id: &str, persona_id: Uuid) -> Result<(), ChatError> {
        if self.persona_repo.delete_persona(&persona_id, owner_id).await? {
            Ok(())
        } else {
            Err(ChatError::PersonaNotFound)
        }
    }
}

/// Strictly increasing timestamps for messages stored in one call.
///
/// Keeps the user message ahead of its replies and split parts in order.
struct Timestamps {
    last: Option<DateTime<Utc>>,
    base: DateTime<Utc>,
}

impl Timestamps {
    fn new(base: DateTime<Utc>) -> Self {
        Self { last: None, base }
    }

    fn next(&mut self) -> DateTime<Utc> {
        let stamp = match self.last {
            Some(last) => (last + Duration::milliseconds(1)).max(self.base),
            None => self.base,
        };
        self.last = Some(stamp);
        stamp
    }
}
