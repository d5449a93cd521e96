//! SQLite connection pools for the Kindred store.
//!
//! Writes go through one connection so SQLite never sees two concurrent
//! writers; reads fan out over a separate read-only pool. WAL journaling lets
//! the two proceed side by side.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

const READER_CONNECTIONS: u32 = 8;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Reader and writer pools over the same database file.
#[derive(Clone)]
pub struct DatabasePool {
    /// Read-only, up to 8 connections.
    pub reader: SqlitePool,
    /// Exactly one connection; every INSERT/UPDATE/DELETE goes here.
    pub writer: SqlitePool,
}

impl DatabasePool {
    /// Open (creating if needed) the database at `database_url` and apply
    /// pending migrations before the reader pool connects.
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options.clone())
            .await?;

        sqlx::migrate!("../../migrations").run(&writer).await?;

        let reader = SqlitePoolOptions::new()
            .max_connections(READER_CONNECTIONS)
            .connect_with(options.read_only(true))
            .await?;

        Ok(Self { reader, writer })
    }
}

/// Database URL for `kindred.db` inside the given data directory.
pub fn database_url(data_dir: &Path) -> String {
    format!("sqlite://{}/kindred.db", data_dir.display())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A migrated pool over a fresh file that outlives the test.
    pub(crate) async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap().keep();
        DatabasePool::new(&database_url(&dir)).await.unwrap()
    }

    #[tokio::test]
    async fn test_migrations_create_engine_schema() {
        let pool = test_pool().await;

        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' \
             AND name IN ('personas', 'chat_sessions', 'chat_messages', 'session_messages')",
        )
        .fetch_one(&pool.reader)
        .await
        .unwrap();
        assert_eq!(count, 4);
    }

    #[tokio::test]
    async fn test_writer_runs_in_wal_mode() {
        let pool = test_pool().await;
        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&pool.writer)
            .await
            .unwrap();
        assert!(mode.eq_ignore_ascii_case("wal"));
    }

    #[tokio::test]
    async fn test_session_requires_existing_persona() {
        let pool = test_pool().await;
        let orphan = sqlx::query(
            "INSERT INTO chat_sessions (id, owner_id, persona_id, started_at) \
             VALUES ('s1', 'alice', 'no-such-persona', '2026-01-01T00:00:00.000000000Z')",
        )
        .execute(&pool.writer)
        .await;
        assert!(orphan.is_err());
    }

    #[tokio::test]
    async fn test_reader_rejects_writes() {
        let pool = test_pool().await;
        let result = sqlx::query("DELETE FROM personas").execute(&pool.reader).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_database_url() {
        let url = database_url(Path::new("/tmp/kindred"));
        assert_eq!(url, "sqlite:///tmp/kindred/kindred.db");
    }
}
