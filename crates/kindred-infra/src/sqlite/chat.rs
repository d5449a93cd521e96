//! SQLite chat repository implementation.
//!
//! Implements `ChatRepository` from `kindred-core` using sqlx with split read/write
//! pools. Messages hang off sessions through the `session_messages` membership
//! table; read state lives on the message row.

use kindred_core::chat::repository::ChatRepository;
use kindred_types::chat::{ChatMessage, ChatSession, SenderKind};
use kindred_types::error::RepositoryError;
use kindred_types::state::SessionState;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{DELETE_ORPHAN_MESSAGES, format_datetime, parse_datetime, parse_uuid, query_error};

/// SQLite-backed implementation of `ChatRepository`.
pub struct SqliteChatRepository {
    pool: DatabasePool,
}

impl SqliteChatRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct ChatSessionRow {
    id: String,
    owner_id: String,
    persona_id: String,
    started_at: String,
    summary: String,
    message_count: i64,
    last_activity_at: Option<String>,
    current_state: String,
    revision: i64,
}

impl ChatSessionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            persona_id: row.try_get("persona_id")?,
            started_at: row.try_get("started_at")?,
            summary: row.try_get("summary")?,
            message_count: row.try_get("message_count")?,
            last_activity_at: row.try_get("last_activity_at")?,
            current_state: row.try_get("current_state")?,
            revision: row.try_get("revision")?,
        })
    }

    fn into_session(self) -> Result<ChatSession, RepositoryError> {
        let state: SessionState = serde_json::from_str(&self.current_state)
            .map_err(|e| RepositoryError::Query(format!("invalid current_state: {e}")))?;

        Ok(ChatSession {
            id: parse_uuid(&self.id, "session id")?,
            owner_id: self.owner_id,
            persona_id: parse_uuid(&self.persona_id, "persona_id")?,
            started_at: parse_datetime(&self.started_at)?,
            summary: self.summary,
            message_count: self.message_count as u32,
            last_activity_at: self.last_activity_at.as_deref().map(parse_datetime).transpose()?,
            state,
            revision: self.revision as u64,
        })
    }
}

struct ChatMessageRow {
    id: String,
    content: String,
    sender: String,
    is_read: bool,
    metadata: Option<String>,
    critical: bool,
    critical_type: Option<String>,
    created_at: String,
}

impl ChatMessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            content: row.try_get("content")?,
            sender: row.try_get("sender")?,
            is_read: row.try_get("is_read")?,
            metadata: row.try_get("metadata")?,
            critical: row.try_get("critical")?,
            critical_type: row.try_get("critical_type")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_message(self) -> Result<ChatMessage, RepositoryError> {
        let sender: SenderKind = self.sender.parse().map_err(RepositoryError::Query)?;
        let metadata = self
            .metadata
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("invalid metadata: {e}")))?;

        Ok(ChatMessage {
            id: parse_uuid(&self.id, "message id")?,
            content: self.content,
            sender,
            is_read: self.is_read,
            metadata,
            critical: self.critical,
            critical_type: self.critical_type,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

fn sessions_from_rows(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<ChatSession>, RepositoryError> {
    let mut sessions = Vec::with_capacity(rows.len());
    for row in rows {
        sessions.push(ChatSessionRow::from_row(row).map_err(query_error)?.into_session()?);
    }
    Ok(sessions)
}

fn messages_from_rows(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<ChatMessage>, RepositoryError> {
    let mut messages = Vec::with_capacity(rows.len());
    for row in rows {
        messages.push(ChatMessageRow::from_row(row).map_err(query_error)?.into_message()?);
    }
    Ok(messages)
}

fn state_json(session: &ChatSession) -> Result<String, RepositoryError> {
    serde_json::to_string(&session.state).map_err(|e| RepositoryError::Query(e.to_string()))
}

/// Messages attached to a session, in creation order.
const SESSION_MESSAGES: &str = r#"SELECT m.* FROM chat_messages m
    JOIN session_messages sm ON sm.message_id = m.id
    WHERE sm.session_id = ?"#;

/// Agent-authored messages still unread in a session.
const UNREAD_AGENT_FILTER: &str = r#"is_read = 0 AND sender IN ('assistant', 'growth')
    AND id IN (SELECT message_id FROM session_messages WHERE session_id = ?)"#;

/// Conditional session write. Affects no rows when the revision moved on.
async fn write_session(conn: &mut SqliteConnection, session: &ChatSession) -> Result<bool, RepositoryError> {
    let result = sqlx::query(
        r#"UPDATE chat_sessions
           SET persona_id = ?, summary = ?, message_count = ?, last_activity_at = ?, current_state = ?,
               revision = revision + 1
           WHERE id = ? AND revision = ?"#,
    )
    .bind(session.persona_id.to_string())
    .bind(&session.summary)
    .bind(session.message_count as i64)
    .bind(session.last_activity_at.as_ref().map(format_datetime))
    .bind(state_json(session)?)
    .bind(session.id.to_string())
    .bind(session.revision as i64)
    .execute(&mut *conn)
    .await
    .map_err(query_error)?;

    Ok(result.rows_affected() > 0)
}

async fn insert_message(
    conn: &mut SqliteConnection,
    session_id: &Uuid,
    message: &ChatMessage,
) -> Result<(), RepositoryError> {
    let metadata = message
        .metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

    sqlx::query(
        r#"INSERT INTO chat_messages (id, content, sender, is_read, metadata, critical, critical_type, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(message.id.to_string())
    .bind(&message.content)
    .bind(message.sender.to_string())
    .bind(message.is_read)
    .bind(metadata)
    .bind(message.critical)
    .bind(&message.critical_type)
    .bind(format_datetime(&message.created_at))
    .execute(&mut *conn)
    .await
    .map_err(query_error)?;

    sqlx::query("INSERT INTO session_messages (session_id, message_id) VALUES (?, ?)")
        .bind(session_id.to_string())
        .bind(message.id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(query_error)?;
    Ok(())
}

async fn count_with(conn: &mut SqliteConnection, sql: &str, session_id: &Uuid) -> Result<u32, RepositoryError> {
    let row = sqlx::query(sql)
        .bind(session_id.to_string())
        .fetch_one(&mut *conn)
        .await
        .map_err(query_error)?;
    let count: i64 = row.try_get("cnt").map_err(query_error)?;
    Ok(count as u32)
}

const COUNT_SESSION_MESSAGES: &str = "SELECT COUNT(*) AS cnt FROM session_messages WHERE session_id = ?";

// ---------------------------------------------------------------------------
// ChatRepository implementation
// ---------------------------------------------------------------------------

impl ChatRepository for SqliteChatRepository {
    async fn create_session(&self, session: &ChatSession) -> Result<ChatSession, RepositoryError> {
        sqlx::query(
            r#"INSERT INTO chat_sessions (id, owner_id, persona_id, started_at, summary, message_count, last_activity_at, current_state, revision)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(session.id.to_string())
        .bind(&session.owner_id)
        .bind(session.persona_id.to_string())
        .bind(format_datetime(&session.started_at))
        .bind(&session.summary)
        .bind(session.message_count as i64)
        .bind(session.last_activity_at.as_ref().map(format_datetime))
        .bind(state_json(session)?)
        .bind(session.revision as i64)
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(session.clone())
    }

    async fn get_session(
        &self,
        session_id: &Uuid,
        owner_id: &str,
    ) -> Result<Option<ChatSession>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM chat_sessions WHERE id = ? AND owner_id = ?")
            .bind(session_id.to_string())
            .bind(owner_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => Ok(Some(
                ChatSessionRow::from_row(&row).map_err(query_error)?.into_session()?,
            )),
            None => Ok(None),
        }
    }

    async fn get_session_by_id(&self, session_id: &Uuid) -> Result<Option<ChatSession>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM chat_sessions WHERE id = ?")
            .bind(session_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => Ok(Some(
                ChatSessionRow::from_row(&row).map_err(query_error)?.into_session()?,
            )),
            None => Ok(None),
        }
    }

    async fn update_session(&self, session: &ChatSession) -> Result<bool, RepositoryError> {
        let mut conn = self.pool.writer.acquire().await.map_err(query_error)?;
        if write_session(&mut conn, session).await? {
            return Ok(true);
        }

        let exists = sqlx::query("SELECT 1 FROM chat_sessions WHERE id = ?")
            .bind(session.id.to_string())
            .fetch_optional(&mut *conn)
            .await
            .map_err(query_error)?;
        match exists {
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
        // The write goes first so the transaction holds the write lock
        // before the checks below read anything.
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;
        if !write_session(&mut tx, session).await? {
            return Ok(false);
        }

        let live = count_with(&mut tx, COUNT_SESSION_MESSAGES, &session.id).await?;
        let unread_sql = format!("SELECT COUNT(*) AS cnt FROM chat_messages WHERE {UNREAD_AGENT_FILTER}");
        let unread = count_with(&mut tx, &unread_sql, &session.id).await?;
        if live != seen_messages || unread > 0 {
            return Ok(false);
        }

        insert_message(&mut tx, &session.id, message).await?;
        tx.commit().await.map_err(query_error)?;
        Ok(true)
    }

    async fn delete_session(&self, session_id: &Uuid, owner_id: &str) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        let result = sqlx::query("DELETE FROM chat_sessions WHERE id = ? AND owner_id = ?")
            .bind(session_id.to_string())
            .bind(owner_id)
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;
        let deleted = result.rows_affected() > 0;

        if deleted {
            sqlx::query(DELETE_ORPHAN_MESSAGES)
                .execute(&mut *tx)
                .await
                .map_err(query_error)?;
        }

        tx.commit().await.map_err(query_error)?;
        Ok(deleted)
    }

    async fn list_sessions(
        &self,
        owner_id: &str,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<ChatSession>, RepositoryError> {
        let mut sql =
            String::from("SELECT * FROM chat_sessions WHERE owner_id = ? ORDER BY started_at DESC");

        // SQLite requires a LIMIT before OFFSET.
        match (limit, offset) {
            (Some(limit), _) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(_)) => sql.push_str(" LIMIT -1"),
            (None, None) => {}
        }
        if let Some(offset) = offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        let rows = sqlx::query(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        sessions_from_rows(&rows)
    }

    async fn list_sessions_with_activity(&self) -> Result<Vec<ChatSession>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM chat_sessions WHERE last_activity_at IS NOT NULL ORDER BY last_activity_at ASC",
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        sessions_from_rows(&rows)
    }

    async fn save_message(&self, session_id: &Uuid, message: &ChatMessage) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;
        insert_message(&mut tx, session_id, message).await?;
        tx.commit().await.map_err(query_error)?;
        Ok(())
    }

    async fn attach_message(&self, session_id: &Uuid, message_id: &Uuid) -> Result<(), RepositoryError> {
        let exists = sqlx::query("SELECT 1 FROM chat_messages WHERE id = ?")
            .bind(message_id.to_string())
            .fetch_optional(&self.pool.writer)
            .await
            .map_err(query_error)?;
        if exists.is_none() {
            return Err(RepositoryError::NotFound);
        }

        sqlx::query("INSERT OR IGNORE INTO session_messages (session_id, message_id) VALUES (?, ?)")
            .bind(session_id.to_string())
            .bind(message_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;
        Ok(())
    }

    async fn get_messages(
        &self,
        session_id: &Uuid,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let mut sql = format!("{SESSION_MESSAGES} ORDER BY m.created_at ASC, m.id ASC");

        match (limit, offset) {
            (Some(limit), _) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(_)) => sql.push_str(" LIMIT -1"),
            (None, None) => {}
        }
        if let Some(offset) = offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        let rows = sqlx::query(&sql)
            .bind(session_id.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        messages_from_rows(&rows)
    }

    async fn get_recent_messages(
        &self,
        session_id: &Uuid,
        count: usize,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let sql = format!("{SESSION_MESSAGES} ORDER BY m.created_at DESC, m.id DESC LIMIT ?");
        let rows = sqlx::query(&sql)
            .bind(session_id.to_string())
            .bind(count as i64)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        let mut messages = messages_from_rows(&rows)?;
        messages.reverse();
        Ok(messages)
    }

    async fn mark_agent_messages_read(&self, session_id: &Uuid) -> Result<u64, RepositoryError> {
        let sql = format!("UPDATE chat_messages SET is_read = 1 WHERE {UNREAD_AGENT_FILTER}");
        let result = sqlx::query(&sql)
            .bind(session_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;
        Ok(result.rows_affected())
    }

    async fn mark_messages_read(
        &self,
        session_id: &Uuid,
        message_ids: &[Uuid],
    ) -> Result<u64, RepositoryError> {
        if message_ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; message_ids.len()].join(", ");
        let sql = format!(
            r#"UPDATE chat_messages SET is_read = 1
               WHERE is_read = 0 AND id IN ({placeholders})
               AND id IN (SELECT message_id FROM session_messages WHERE session_id = ?)"#
        );

        let mut query = sqlx::query(&sql);
        for id in message_ids {
            query = query.bind(id.to_string());
        }
        let result = query
            .bind(session_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;
        Ok(result.rows_affected())
    }

    async fn count_unread_agent_messages(&self, session_id: &Uuid) -> Result<u32, RepositoryError> {
        let sql = format!("SELECT COUNT(*) AS cnt FROM chat_messages WHERE {UNREAD_AGENT_FILTER}");
        let mut conn = self.pool.reader.acquire().await.map_err(query_error)?;
        count_with(&mut conn, &sql, session_id).await
    }

    async fn get_message_count(&self, session_id: &Uuid) -> Result<u32, RepositoryError> {
        let mut conn = self.pool.reader.acquire().await.map_err(query_error)?;
        count_with(&mut conn, COUNT_SESSION_MESSAGES, session_id).await
    }
}
