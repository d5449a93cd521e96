//! Test doubles: an in-memory store implementing both repositories and a
//! scripted LLM provider.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use kindred_types::chat::{ChatMessage, ChatSession};
use kindred_types::error::RepositoryError;
use kindred_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, StopReason, Usage,
};
use kindred_types::persona::{NewPersona, Persona};

use crate::chat::repository::ChatRepository;
use crate::llm::box_provider::BoxLlmProvider;
use crate::llm::client::LlmClient;
use crate::llm::provider::LlmProvider;
use crate::repository::persona::PersonaRepository;

#[derive(Default)]
struct StoreInner {
    sessions: HashMap<Uuid, ChatSession>,
    messages: HashMap<Uuid, ChatMessage>,
    /// (session_id, message_id) in attach order.
    membership: Vec<(Uuid, Uuid)>,
    personas: HashMap<Uuid, Persona>,
    failing_sessions: HashSet<Uuid>,
}

/// Shared in-memory backing for both repository traits.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap()
    }

    /// Make every message query for this session fail.
    pub fn fail_session(&self, session_id: Uuid) {
        self.lock().failing_sessions.insert(session_id);
    }

    pub fn session(&self, session_id: &Uuid) -> ChatSession {
        self.lock().sessions[session_id].clone()
    }

    pub fn persona(&self, persona_id: &Uuid) -> Persona {
        self.lock().personas[persona_id].clone()
    }

    pub fn persona_count(&self) -> usize {
        self.lock().personas.len()
    }

    pub fn message(&self, message_id: &Uuid) -> ChatMessage {
        self.lock().messages[message_id].clone()
    }

    /// Insert a session directly, bypassing the service.
    pub fn put_session(&self, session: ChatSession) {
        self.lock().sessions.insert(session.id, session);
    }

    pub fn put_persona(&self, persona: Persona) {
        self.lock().personas.insert(persona.id, persona);
    }

    fn session_messages(inner: &StoreInner, session_id: &Uuid) -> Vec<ChatMessage> {
        let mut messages: Vec<ChatMessage> = inner
            .membership
            .iter()
            .filter(|(sid, _)| sid == session_id)
            .filter_map(|(_, mid)| inner.messages.get(mid).cloned())
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        messages
    }

    fn check(inner: &StoreInner, session_id: &Uuid) -> Result<(), RepositoryError> {
        if inner.failing_sessions.contains(session_id) {
            return Err(RepositoryError::Query("injected failure".to_string()));
        }
        Ok(())
    }
}

impl ChatRepository for InMemoryStore {
    async fn create_session(&self, session: &ChatSession) -> Result<ChatSession, RepositoryError> {
        self.lock().sessions.insert(session.id, session.clone());
        Ok(session.clone())
    }

    async fn get_session(
        &self,
        session_id: &Uuid,
        owner_id: &str,
    ) -> Result<Option<ChatSession>, RepositoryError> {
        Ok(self
            .lock()
            .sessions
            .get(session_id)
            .filter(|s| s.owner_id == owner_id)
            .cloned())
    }

    async fn get_session_by_id(
        &self,
        session_id: &Uuid,
    ) -> Result<Option<ChatSession>, RepositoryError> {
        Ok(self.lock().sessions.get(session_id).cloned())
    }

    async fn update_session(&self, session: &ChatSession) -> Result<bool, RepositoryError> {
        let mut inner = self.lock();
        match inner.sessions.get_mut(&session.id) {
            Some(existing) if existing.revision == session.revision => {
                *existing = session.clone();
                existing.revision += 1;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn commit_proactive_message(
        &self,
        session: &ChatSession,
        seen_messages: u32,
        message: &ChatMessage,
    ) -> Result<bool, RepositoryError> {
        let mut inner = self.lock();
        Self::check(&inner, &session.id)?;
        if inner.sessions.get(&session.id).map(|s| s.revision) != Some(session.revision) {
            return Ok(false);
        }
        let messages = Self::session_messages(&inner, &session.id);
        let unread = messages.iter().any(|m| m.sender.is_agent() && !m.is_read);
        if messages.len() as u32 != seen_messages || unread {
            return Ok(false);
        }

        inner.messages.insert(message.id, message.clone());
        inner.membership.push((session.id, message.id));
        let mut stored = session.clone();
        stored.revision += 1;
        inner.sessions.insert(session.id, stored);
        Ok(true)
    }

    async fn delete_session(&self, session_id: &Uuid, owner_id: &str) -> Result<bool, RepositoryError> {
        let mut inner = self.lock();
        let owned = inner
            .sessions
            .get(session_id)
            .is_some_and(|s| s.owner_id == owner_id);
        if !owned {
            return Ok(false);
        }
        inner.sessions.remove(session_id);
        inner.membership.retain(|(sid, _)| sid != session_id);
        let attached: HashSet<Uuid> = inner.membership.iter().map(|(_, mid)| *mid).collect();
        inner.messages.retain(|id, _| attached.contains(id));
        Ok(true)
    }

    async fn list_sessions(
        &self,
        owner_id: &str,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<ChatSession>, RepositoryError> {
        let inner = self.lock();
        let mut sessions: Vec<ChatSession> = inner
            .sessions
            .values()
            .filter(|s| s.owner_id == owner_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        let offset = offset.unwrap_or(0).max(0) as usize;
        let limit = limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        Ok(sessions.into_iter().skip(offset).take(limit).collect())
    }

    async fn list_sessions_with_activity(&self) -> Result<Vec<ChatSession>, RepositoryError> {
        Ok(self
            .lock()
            .sessions
            .values()
            .filter(|s| s.last_activity_at.is_some())
            .cloned()
            .collect())
    }

    async fn save_message(&self, session_id: &Uuid, message: &ChatMessage) -> Result<(), RepositoryError> {
        let mut inner = self.lock();
        Self::check(&inner, session_id)?;
        inner.messages.insert(message.id, message.clone());
        inner.membership.push((*session_id, message.id));
        Ok(())
    }

    async fn attach_message(&self, session_id: &Uuid, message_id: &Uuid) -> Result<(), RepositoryError> {
        let mut inner = self.lock();
        if !inner.messages.contains_key(message_id) {
            return Err(RepositoryError::NotFound);
        }
        if !inner.membership.contains(&(*session_id, *message_id)) {
            inner.membership.push((*session_id, *message_id));
        }
        Ok(())
    }

    async fn get_messages(
        &self,
        session_id: &Uuid,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let inner = self.lock();
        Self::check(&inner, session_id)?;
        let offset = offset.unwrap_or(0).max(0) as usize;
        let limit = limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        Ok(Self::session_messages(&inner, session_id)
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect())
    }

    async fn get_recent_messages(
        &self,
        session_id: &Uuid,
        count: usize,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let inner = self.lock();
        Self::check(&inner, session_id)?;
        let messages = Self::session_messages(&inner, session_id);
        let skip = messages.len().saturating_sub(count);
        Ok(messages.into_iter().skip(skip).collect())
    }

    async fn mark_agent_messages_read(&self, session_id: &Uuid) -> Result<u64, RepositoryError> {
        let mut inner = self.lock();
        Self::check(&inner, session_id)?;
        let ids: Vec<Uuid> = Self::session_messages(&inner, session_id)
            .into_iter()
            .filter(|m| m.sender.is_agent() && !m.is_read)
            .map(|m| m.id)
            .collect();
        for id in &ids {
            if let Some(message) = inner.messages.get_mut(id) {
                message.is_read = true;
            }
        }
        Ok(ids.len() as u64)
    }

    async fn mark_messages_read(
        &self,
        session_id: &Uuid,
        message_ids: &[Uuid],
    ) -> Result<u64, RepositoryError> {
        let mut inner = self.lock();
        let attached: Vec<Uuid> = Self::session_messages(&inner, session_id)
            .into_iter()
            .filter(|m| !m.is_read && message_ids.contains(&m.id))
            .map(|m| m.id)
            .collect();
        for id in &attached {
            if let Some(message) = inner.messages.get_mut(id) {
                message.is_read = true;
            }
        }
        Ok(attached.len() as u64)
    }

    async fn count_unread_agent_messages(&self, session_id: &Uuid) -> Result<u32, RepositoryError> {
        let inner = self.lock();
        Self::check(&inner, session_id)?;
        Ok(Self::session_messages(&inner, session_id)
            .iter()
            .filter(|m| m.sender.is_agent() && !m.is_read)
            .count() as u32)
    }

    async fn get_message_count(&self, session_id: &Uuid) -> Result<u32, RepositoryError> {
        let inner = self.lock();
        Self::check(&inner, session_id)?;
        Ok(Self::session_messages(&inner, session_id).len() as u32)
    }
}

impl PersonaRepository for InMemoryStore {
    async fn ensure_persona(
        &self,
        owner_id: &str,
        defaults: &NewPersona,
        now: DateTime<Utc>,
    ) -> Result<Persona, RepositoryError> {
        let mut inner = self.lock();
        if let Some(existing) = inner
            .personas
            .values()
            .find(|p| p.owner_id == owner_id && p.name == defaults.name)
        {
            return Ok(existing.clone());
        }
        let persona = defaults.clone().into_persona(owner_id, now);
        inner.personas.insert(persona.id, persona.clone());
        Ok(persona)
    }

    async fn create_persona(&self, persona: &Persona) -> Result<Persona, RepositoryError> {
        let mut inner = self.lock();
        if inner
            .personas
            .values()
            .any(|p| p.owner_id == persona.owner_id && p.name == persona.name)
        {
            return Err(RepositoryError::Conflict(format!(
                "persona '{}' already exists",
                persona.name
            )));
        }
        inner.personas.insert(persona.id, persona.clone());
        Ok(persona.clone())
    }

    async fn get_persona(&self, persona_id: &Uuid, owner_id: &str) -> Result<Option<Persona>, RepositoryError> {
        Ok(self
            .lock()
            .personas
            .get(persona_id)
            .filter(|p| p.owner_id == owner_id)
            .cloned())
    }

    async fn get_persona_by_id(&self, persona_id: &Uuid) -> Result<Option<Persona>, RepositoryError> {
        Ok(self.lock().personas.get(persona_id).cloned())
    }

    async fn list_personas(&self, owner_id: &str) -> Result<Vec<Persona>, RepositoryError> {
        let mut personas: Vec<Persona> = self
            .lock()
            .personas
            .values()
            .filter(|p| p.owner_id == owner_id)
            .cloned()
            .collect();
        personas.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(personas)
    }

    async fn update_persona(&self, persona: &Persona) -> Result<(), RepositoryError> {
        let mut inner = self.lock();
        if inner
            .personas
            .values()
            .any(|p| p.id != persona.id && p.owner_id == persona.owner_id && p.name == persona.name)
        {
            return Err(RepositoryError::Conflict(format!(
                "persona '{}' already exists",
                persona.name
            )));
        }
        match inner.personas.get_mut(&persona.id) {
            Some(existing) => {
                *existing = persona.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn delete_persona(&self, persona_id: &Uuid, owner_id: &str) -> Result<bool, RepositoryError> {
        let mut inner = self.lock();
        let owned = inner
            .personas
            .get(persona_id)
            .is_some_and(|p| p.owner_id == owner_id);
        if owned {
            inner.personas.remove(persona_id);
            inner.sessions.retain(|_, s| s.persona_id != *persona_id);
        }
        Ok(owned)
    }
}

pub type RequestLog = Arc<Mutex<Vec<CompletionRequest>>>;

/// An LLM provider that replays a fixed script of replies and errors.
///
/// Once the script runs out every call fails with a provider error.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: RequestLog,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            requests: Arc::new(Mutex::new(Vec::new())),
            delay: None,
        }
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        self.script.lock().unwrap().push_back(Ok(text.into()));
        self
    }

    pub fn fail(self, error: LlmError) -> Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Handle to the requests seen by this provider.
    pub fn requests(&self) -> RequestLog {
        Arc::clone(&self.requests)
    }

    pub fn into_client(self) -> LlmClient {
        LlmClient::new(BoxLlmProvider::new(self), Duration::from_secs(30))
    }
}

impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        let content = next.unwrap_or_else(|| {
            Err(LlmError::Provider {
                message: "script exhausted".to_string(),
            })
        })?;
        Ok(CompletionResponse {
            id: "resp-scripted".to_string(),
            content,
            model: request.model.clone(),
            stop_reason: StopReason::EndTurn,
            usage: Usage {
                input_tokens: 10,
                output_tokens: 20,
            },
        })
    }
}
