//! End-to-end: the chat service and inactivity sweeper over a real SQLite store.

use std::sync::Arc;

use chrono::{Duration, Utc};

use kindred_core::chat::repository::ChatRepository;
use kindred_core::chat::service::{ChatService, SendMessage};
use kindred_core::chat::sweeper::InactivitySweeper;
use kindred_core::llm::client::LlmClient;
use kindred_infra::sqlite::chat::SqliteChatRepository;
use kindred_infra::sqlite::persona::SqlitePersonaRepository;
use kindred_infra::sqlite::pool::DatabasePool;
use kindred_types::chat::SenderKind;
use kindred_types::config::{EngineSettings, SweeperSettings};

type Service = ChatService<SqliteChatRepository, SqlitePersonaRepository>;

async fn service() -> (Arc<Service>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("kindred.db").display());
    let pool = DatabasePool::new(&url).await.unwrap();
    let service = ChatService::new(
        SqliteChatRepository::new(pool.clone()),
        SqlitePersonaRepository::new(pool),
        LlmClient::unconfigured(),
        EngineSettings::default(),
        "gpt-4o",
    );
    (Arc::new(service), dir)
}

fn say(text: &str, session_id: Option<uuid::Uuid>) -> SendMessage {
    SendMessage {
        message: text.to_string(),
        session_id,
        persona_id: None,
    }
}

#[tokio::test]
async fn conversation_counts_and_summarizes() {
    let (service, _dir) = service().await;

    let first = service.send_message("alice", say("Plan a trip to Lisbon", None)).await.unwrap();
    let mut session_id = first.session_id;
    let mut last = first;
    for i in 0..4 {
        last = service
            .send_message("alice", say(&format!("detail {i}"), Some(session_id)))
            .await
            .unwrap();
        session_id = last.session_id;
    }

    assert!(last.summary_updated);
    assert_eq!(last.summary.as_deref(), Some("Plan a trip to Lisbon"));

    let detail = service.open_session("alice", session_id).await.unwrap();
    assert_eq!(detail.session.message_count, 10);
    assert_eq!(detail.messages.len(), 10);
    assert!(detail.messages.iter().all(|m| m.is_read));
    assert_eq!(detail.messages[0].sender, SenderKind::User);
    assert_eq!(detail.messages[1].sender, SenderKind::Assistant);
}

#[tokio::test]
async fn sweep_sends_one_growth_message_until_read() {
    let (service, _dir) = service().await;
    let mut session_id = None;
    for i in 0..3 {
        let reply = service
            .send_message("alice", say(&format!("message {i}"), session_id))
            .await
            .unwrap();
        session_id = Some(reply.session_id);
    }
    let session_id = session_id.unwrap();
    let before = service.chat_repo().get_session_by_id(&session_id).await.unwrap().unwrap();

    let sweeper = InactivitySweeper::new(Arc::clone(&service), SweeperSettings::default());

    // The last reply is still unread, so nothing goes out.
    let report = sweeper.sweep(Utc::now() + Duration::minutes(30)).await.unwrap();
    assert_eq!(report.messages_sent, 0);

    service.open_session("alice", session_id).await.unwrap();
    let report = sweeper.sweep(Utc::now() + Duration::minutes(30)).await.unwrap();
    assert_eq!(report.messages_sent, 1);

    let after = service.chat_repo().get_session_by_id(&session_id).await.unwrap().unwrap();
    assert_eq!(after.message_count, 7);
    assert_eq!(after.last_activity_at, before.last_activity_at);
    let pending = after.state.proactive_messages.clone().unwrap();
    assert_eq!(pending.len(), 1);

    // Unread growth message blocks the next sweep.
    let report = sweeper.sweep(Utc::now() + Duration::minutes(40)).await.unwrap();
    assert_eq!(report.messages_sent, 0);

    let cleared = service
        .acknowledge_proactive_messages("alice", session_id, &[pending[0].message_id])
        .await
        .unwrap();
    assert_eq!(cleared, 1);
    let acked = service.chat_repo().get_session_by_id(&session_id).await.unwrap().unwrap();
    assert!(acked.state.proactive_messages.is_none());
    assert_eq!(
        service.chat_repo().count_unread_agent_messages(&session_id).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn deleting_session_removes_its_messages() {
    let (service, _dir) = service().await;
    let reply = service.send_message("alice", say("hello", None)).await.unwrap();
    service.delete_session("alice", reply.session_id).await.unwrap();

    assert!(service.open_session("alice", reply.session_id).await.is_err());
    assert!(service.chat_history("alice", None, None).await.unwrap().is_empty());
}
