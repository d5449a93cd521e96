//! Inactivity sweeper: the timer-driven entry point.
//!
//! `sweep(now)` is a plain async function of the current time and the stored
//! sessions; scheduling lives with the caller. Each session is handled under
//! its own lock, and one session's failure never stops the others.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use kindred_types::chat::{ChatMessage, ChatSession, SenderKind};
use kindred_types::config::SweeperSettings;
use kindred_types::decision::ProactiveAction;
use kindred_types::error::ChatError;

use crate::agent::personality::{PERSONALITY_MIN_MESSAGES, PERSONALITY_WINDOW, PersonalityInput};
use crate::agent::proactive::{PROACTIVE_WINDOW, ProactiveContext, ProactiveEngine};
use crate::repository::persona::PersonaRepository;

use super::repository::ChatRepository;
use super::service::ChatService;
use super::session::{PersonalityOutcome, SessionManager};

/// Sessions are reviewed only when active within, and not checked within, this window.
const REVIEW_INTERVAL_HOURS: i64 = 24;

/// Counters for one sweep pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub messages_sent: usize,
    pub waited: usize,
    pub failed: usize,
    pub personality_reviews: usize,
}

enum SessionOutcome {
    Sent(ProactiveAction),
    Waited,
}

pub struct InactivitySweeper<C: ChatRepository, P: PersonaRepository> {
    service: Arc<ChatService<C, P>>,
    settings: SweeperSettings,
}

impl<C: ChatRepository, P: PersonaRepository> InactivitySweeper<C, P> {
    pub fn new(service: Arc<ChatService<C, P>>, settings: SweeperSettings) -> Self {
        Self { service, settings }
    }

    pub fn settings(&self) -> &SweeperSettings {
        &self.settings
    }

    /// One pass over every session with recorded activity.
    #[tracing::instrument(name = "inactivity_sweep", skip(self))]
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, ChatError> {
        let sessions = self.service.chat_repo().list_sessions_with_activity().await?;
        let mut report = SweepReport {
            scanned: sessions.len(),
            ..SweepReport::default()
        };
        let concurrency = self.settings.concurrency.max(1);

        let ids: Vec<Uuid> = sessions.iter().map(|s| s.id).collect();
        let outcomes: Vec<_> = stream::iter(ids)
            .map(|session_id| async move { (session_id, self.sweep_session(session_id, now).await) })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        for (session_id, outcome) in outcomes {
            match outcome {
                Ok(SessionOutcome::Sent(_)) => report.messages_sent += 1,
                Ok(SessionOutcome::Waited) => report.waited += 1,
                Err(err) => {
                    warn!(%session_id, error = %err, "Proactive check failed for session");
                    report.failed += 1;
                }
            }
        }

        if self.settings.personality_review {
            report.personality_reviews = self.review_sessions(&sessions, now, concurrency).await;
        }

        info!(
            scanned = report.scanned,
            sent = report.messages_sent,
            failed = report.failed,
            reviews = report.personality_reviews,
            "Sweep complete"
        );
        Ok(report)
    }

    async fn sweep_session(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<SessionOutcome, ChatError> {
        let _guard = self.service.locks().acquire(session_id).await;
        let repo = self.service.chat_repo();

        // The session may have changed or vanished since the listing.
        let Some(session) = repo.get_session_by_id(&session_id).await? else {
            return Ok(SessionOutcome::Waited);
        };
        let persona = self
            .service
            .persona_repo()
            .get_persona_by_id(&session.persona_id)
            .await?
            .ok_or(ChatError::PersonaNotFound)?;
        let unread_count = repo.count_unread_agent_messages(&session_id).await?;
        let seen_messages = repo.get_message_count(&session_id).await?;
        let recent = repo.get_recent_messages(&session_id, PROACTIVE_WINDOW).await?;

        // A user message newer than the stored activity belongs to a turn
        // still being answered elsewhere.
        let last_user_message = recent
            .iter()
            .rev()
            .find(|m| m.sender == SenderKind::User)
            .map(|m| m.created_at);
        let last_activity_at = session.last_activity_at.max(last_user_message);

        let ctx = ProactiveContext {
            model: &persona.model,
            summary: &session.summary,
            message_count: seen_messages,
            last_activity_at,
            now,
            threshold_minutes: persona.timings.inactivity_threshold(),
            unread_count,
            behavior: persona.proactive_behavior,
            recent: &recent,
        };
        if let Some(wait) = ProactiveEngine::pre_check(&ctx) {
            debug!(%session_id, reason = %wait.reason, "Waiting");
            return Ok(SessionOutcome::Waited);
        }

        let decision = self.service.proactive().decide(&ctx).await;

        let text = match decision.suggested_message.as_deref() {
            Some(text) if decision.action.sends_message() => text,
            _ => {
                debug!(%session_id, action = %decision.action, "No proactive message");
                return Ok(SessionOutcome::Waited);
            }
        };

        let message = ChatMessage::new(SenderKind::Growth, text, now).with_metadata(json!({
            "proactive": true,
            "action": decision.action,
            "reason": decision.reason,
        }));

        let mut manager = SessionManager::new(session);
        manager.record_proactive_message(message.id, message.created_at, &decision);
        manager.set_message_count(seen_messages + 1);
        let committed = repo
            .commit_proactive_message(manager.session(), seen_messages, &message)
            .await?;
        if !committed {
            debug!(%session_id, "Session moved on while deciding, proactive message dropped");
            return Ok(SessionOutcome::Waited);
        }

        info!(%session_id, action = %decision.action, message_id = %message.id, "Proactive message sent");
        Ok(SessionOutcome::Sent(decision.action))
    }

    async fn review_sessions(
        &self,
        sessions: &[ChatSession],
        now: DateTime<Utc>,
        concurrency: usize,
    ) -> usize {
        let due: Vec<Uuid> = sessions
            .iter()
            .filter(|s| review_due(s, now))
            .map(|s| s.id)
            .collect();
        if due.is_empty() {
            return 0;
        }

        let results: Vec<_> = stream::iter(due)
            .map(|session_id| async move { (session_id, self.review_session(session_id, now).await) })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        results
            .into_iter()
            .filter(|(session_id, result)| match result {
                Ok(reviewed) => *reviewed,
                Err(err) => {
                    warn!(%session_id, error = %err, "Personality review failed for session");
                    false
                }
            })
            .count()
    }

    /// Daily review: stores a suggestion at most, never touches the persona.
    async fn review_session(&self, session_id: Uuid, now: DateTime<Utc>) -> Result<bool, ChatError> {
        let _guard = self.service.locks().acquire(session_id).await;
        let repo = self.service.chat_repo();
        let Some(session) = repo.get_session_by_id(&session_id).await? else {
            return Ok(false);
        };
        if !review_due(&session, now) {
            return Ok(false);
        }
        let persona = self
            .service
            .persona_repo()
            .get_persona_by_id(&session.persona_id)
            .await?
            .ok_or(ChatError::PersonaNotFound)?;
        let recent = repo.get_recent_messages(&session_id, PERSONALITY_WINDOW).await?;

        let decision = self
            .service
            .analyzer()
            .analyze(PersonalityInput {
                model: &persona.model,
                message_count: session.message_count,
                current_personality: &persona.personality_prompt,
                summary: &session.summary,
                recent: &recent,
            })
            .await;

        let mut manager = SessionManager::new(session);
        if manager.record_personality_review(decision, now) == PersonalityOutcome::Suggested {
            info!(%session_id, "Personality suggestion stored by review");
        }
        if !repo.update_session(manager.session()).await? {
            debug!(%session_id, "Session changed during review, result discarded");
            return Ok(false);
        }
        Ok(true)
    }
}

fn review_due(session: &ChatSession, now: DateTime<Utc>) -> bool {
    let window = Duration::hours(REVIEW_INTERVAL_HOURS);
    let active = session
        .last_activity_at
        .is_some_and(|at| now - at <= window);
    let unchecked = session
        .state
        .last_personality_check
        .is_none_or(|at| now - at >= window);
    session.message_count >= PERSONALITY_MIN_MESSAGES && active && unchecked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::LlmClient;
    use crate::testing::{InMemoryStore, ScriptedProvider};
    use kindred_types::config::EngineSettings;
    use kindred_types::persona::{NewPersona, PersonaPatch};

    type Sweeper = InactivitySweeper<InMemoryStore, InMemoryStore>;

    fn sweeper_with(llm: LlmClient) -> (Sweeper, InMemoryStore) {
        let store = InMemoryStore::new();
        let service = ChatService::new(
            store.clone(),
            store.clone(),
            llm,
            EngineSettings::default(),
            "gpt-4o",
        );
        (
            InactivitySweeper::new(Arc::new(service), SweeperSettings::default()),
            store,
        )
    }

    /// A session with `count` read messages whose user went quiet `idle` ago.
    async fn idle_session(store: &InMemoryStore, count: usize, idle: Duration, now: DateTime<Utc>) -> ChatSession {
        let persona = NewPersona::default_for("gpt-4o").into_persona("alice", now);
        store.put_persona(persona.clone());
        let mut session = ChatSession::new("alice", persona.id, now - Duration::hours(2));
        session.message_count = count as u32;
        session.last_activity_at = Some(now - idle);
        store.put_session(session.clone());
        let start = now - Duration::hours(1);
        for i in 0..count {
            let sender = if i % 2 == 0 { SenderKind::User } else { SenderKind::Assistant };
            let mut msg = ChatMessage::new(sender, format!("m{i}"), start + Duration::seconds(i as i64));
            msg.is_read = true;
            store.save_message(&session.id, &msg).await.unwrap();
        }
        session
    }

    #[tokio::test]
    async fn test_fallback_sends_growth_message() {
        let now = Utc::now();
        let (sweeper, store) = sweeper_with(LlmClient::unconfigured());
        let session = idle_session(&store, 6, Duration::minutes(10), now).await;

        let report = sweeper.sweep(now).await.unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.messages_sent, 1);

        let stored = store.session(&session.id);
        assert_eq!(stored.message_count, 7);
        assert_eq!(stored.last_activity_at, session.last_activity_at);
        let pending = stored.state.proactive_messages.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].action, ProactiveAction::Continue);

        let message = store.message(&pending[0].message_id);
        assert_eq!(message.sender, SenderKind::Growth);
        assert!(!message.is_read);
        assert_eq!(message.metadata.unwrap()["proactive"], true);
    }

    #[tokio::test]
    async fn test_unread_reply_blocks_second_send() {
        let now = Utc::now();
        let (sweeper, store) = sweeper_with(LlmClient::unconfigured());
        let session = idle_session(&store, 6, Duration::minutes(10), now).await;

        sweeper.sweep(now).await.unwrap();
        let report = sweeper.sweep(now + Duration::minutes(5)).await.unwrap();
        assert_eq!(report.messages_sent, 0);
        assert_eq!(report.waited, 1);
        assert_eq!(store.session(&session.id).message_count, 7);
    }

    #[tokio::test]
    async fn test_recent_activity_waits() {
        let now = Utc::now();
        let (sweeper, store) = sweeper_with(LlmClient::unconfigured());
        idle_session(&store, 6, Duration::minutes(2), now).await;
        let report = sweeper.sweep(now).await.unwrap();
        assert_eq!(report.messages_sent, 0);
        assert_eq!(report.waited, 1);
    }

    #[tokio::test]
    async fn test_short_conversation_waits_in_fallback() {
        let now = Utc::now();
        let (sweeper, store) = sweeper_with(LlmClient::unconfigured());
        idle_session(&store, 4, Duration::minutes(30), now).await;
        let report = sweeper.sweep(now).await.unwrap();
        assert_eq!(report.messages_sent, 0);
    }

    #[tokio::test]
    async fn test_model_wait_sends_nothing() {
        let now = Utc::now();
        let client = ScriptedProvider::new()
            .reply(r#"{"action": "wait", "reason": "user is busy", "suggested_message": null}"#)
            .into_client();
        let (sweeper, store) = sweeper_with(client);
        let session = idle_session(&store, 6, Duration::minutes(10), now).await;
        let report = sweeper.sweep(now).await.unwrap();
        assert_eq!(report.messages_sent, 0);
        assert!(store.session(&session.id).state.proactive_messages.is_none());
    }

    #[tokio::test]
    async fn test_new_topic_without_message_sends_nothing() {
        let now = Utc::now();
        let client = ScriptedProvider::new()
            .reply(r#"{"action": "new_topic", "reason": "stale"}"#)
            .into_client();
        let (sweeper, store) = sweeper_with(client);
        idle_session(&store, 6, Duration::minutes(10), now).await;
        let report = sweeper.sweep(now).await.unwrap();
        assert_eq!(report.messages_sent, 0);
    }

    #[tokio::test]
    async fn test_failing_session_does_not_stop_others() {
        let now = Utc::now();
        let (sweeper, store) = sweeper_with(LlmClient::unconfigured());
        let broken = idle_session(&store, 6, Duration::minutes(10), now).await;
        let healthy = idle_session(&store, 6, Duration::minutes(10), now).await;
        store.fail_session(broken.id);

        let report = sweeper.sweep(now).await.unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.messages_sent, 1);
        assert_eq!(store.session(&healthy.id).message_count, 7);
    }

    #[tokio::test]
    async fn test_review_stores_suggestion_without_applying() {
        let now = Utc::now();
        let client = ScriptedProvider::new()
            .reply(r#"{"action": "wait", "reason": "recent", "suggested_message": null}"#)
            .reply(r#"{"should_update": true, "reason": "formal user", "suggested_personality": "Be formal.", "confidence": 0.95}"#)
            .into_client();
        let (sweeper, store) = sweeper_with(client);
        let session = idle_session(&store, 20, Duration::minutes(10), now).await;

        let report = sweeper.sweep(now).await.unwrap();
        assert_eq!(report.personality_reviews, 1);

        let stored = store.session(&session.id);
        assert_eq!(stored.state.last_personality_check, Some(now));
        assert!(stored.state.has_personality_suggestion());
        assert!(store.persona(&session.persona_id).personality_prompt.is_empty());
    }

    #[tokio::test]
    async fn test_review_skips_recently_checked() {
        let now = Utc::now();
        let (sweeper, store) = sweeper_with(LlmClient::unconfigured());
        let mut session = idle_session(&store, 20, Duration::minutes(2), now).await;
        session.state.last_personality_check = Some(now - Duration::hours(3));
        store.put_session(session);

        let report = sweeper.sweep(now).await.unwrap();
        assert_eq!(report.personality_reviews, 0);
    }

    #[tokio::test]
    async fn test_persona_threshold_edit_changes_decision() {
        let now = Utc::now();
        let (sweeper, store) = sweeper_with(LlmClient::unconfigured());
        let session = idle_session(&store, 6, Duration::minutes(20), now).await;

        let patient: PersonaPatch =
            serde_json::from_str(r#"{"timings": {"inactivity_threshold_minutes": 60}}"#).unwrap();
        sweeper
            .service
            .update_persona("alice", session.persona_id, patient)
            .await
            .unwrap();
        let report = sweeper.sweep(now).await.unwrap();
        assert_eq!(report.messages_sent, 0);
        assert_eq!(report.waited, 1);

        let eager: PersonaPatch =
            serde_json::from_str(r#"{"timings": {"inactivity_threshold_minutes": 15}}"#).unwrap();
        sweeper
            .service
            .update_persona("alice", session.persona_id, eager)
            .await
            .unwrap();
        let report = sweeper.sweep(now).await.unwrap();
        assert_eq!(report.messages_sent, 1);
        assert_eq!(store.session(&session.id).message_count, 7);
    }

    #[tokio::test]
    async fn test_stale_decision_is_not_committed() {
        let now = Utc::now();
        let client = ScriptedProvider::new()
            .reply(r#"{"action": "continue", "reason": "idle", "suggested_message": "Still planning the trip?"}"#)
            .delay(std::time::Duration::from_millis(50))
            .into_client();
        let (sweeper, store) = sweeper_with(client);
        let session = idle_session(&store, 6, Duration::minutes(10), now).await;

        // The user writes from another process while the model is deciding.
        let late_user = async {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            let message = ChatMessage::new(SenderKind::User, "back again", now);
            store.save_message(&session.id, &message).await.unwrap();
        };
        let (report, ()) = tokio::join!(sweeper.sweep(now), late_user);

        let report = report.unwrap();
        assert_eq!(report.messages_sent, 0);
        assert_eq!(report.waited, 1);
        let messages = store.get_messages(&session.id, None, None).await.unwrap();
        assert!(messages.iter().all(|m| m.sender != SenderKind::Growth));
        assert!(store.session(&session.id).state.proactive_messages.is_none());
    }

    #[test]
    fn test_review_due_rules() {
        let now = Utc::now();
        let mut session = ChatSession::new("alice", Uuid::now_v7(), now);
        session.message_count = 25;
        assert!(!review_due(&session, now), "no activity yet");

        session.last_activity_at = Some(now - Duration::hours(1));
        assert!(review_due(&session, now));

        session.last_activity_at = Some(now - Duration::hours(30));
        assert!(!review_due(&session, now), "inactive for over a day");

        session.last_activity_at = Some(now - Duration::hours(1));
        session.message_count = 19;
        assert!(!review_due(&session, now));
    }
}
