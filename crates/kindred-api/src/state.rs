//! Application state wiring all services together.
//!
//! AppState holds the concrete service instances used by both CLI and REST API.
//! `ChatService` and `InactivitySweeper` are generic over the repository traits;
//! AppState pins them to the SQLite implementations.

use std::path::PathBuf;
use std::sync::Arc;

use kindred_core::chat::service::ChatService;
use kindred_core::chat::sweeper::InactivitySweeper;
use kindred_core::llm::client::LlmClient;
use kindred_infra::config::{build_llm_client, load_global_config, resolve_data_dir};
use kindred_infra::sqlite::chat::SqliteChatRepository;
use kindred_infra::sqlite::persona::SqlitePersonaRepository;
use kindred_infra::sqlite::pool::{DatabasePool, database_url};
use kindred_types::config::GlobalConfig;

pub type ConcreteChatService = ChatService<SqliteChatRepository, SqlitePersonaRepository>;

pub type ConcreteSweeper = InactivitySweeper<SqliteChatRepository, SqlitePersonaRepository>;

/// Shared application state holding all services.
///
/// Used by both CLI commands and REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ConcreteChatService>,
    pub sweeper: Arc<ConcreteSweeper>,
    pub config: Arc<GlobalConfig>,
    /// False when no API key was found; every component answers with its fallback.
    pub llm_configured: bool,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Initialize the application state: load config, connect to DB, wire services.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_global_config(&data_dir).await;
        let db_pool = DatabasePool::new(&database_url(&data_dir)).await?;
        let llm = build_llm_client(&config.llm)?;

        if let Some(provider) = llm.provider_name() {
            tracing::info!(provider, model = %config.llm.model, "LLM provider configured");
        }

        Ok(Self::from_parts(data_dir, config, db_pool, llm))
    }

    /// Wire services over an already-open pool and LLM gateway.
    pub fn from_parts(
        data_dir: PathBuf,
        config: GlobalConfig,
        db_pool: DatabasePool,
        llm: LlmClient,
    ) -> Self {
        let llm_configured = llm.is_configured();
        let chat_service = Arc::new(ChatService::new(
            SqliteChatRepository::new(db_pool.clone()),
            SqlitePersonaRepository::new(db_pool.clone()),
            llm,
            config.engine.clone(),
            config.llm.model.clone(),
        ));
        let sweeper = Arc::new(InactivitySweeper::new(
            Arc::clone(&chat_service),
            config.sweeper.clone(),
        ));

        Self {
            chat_service,
            sweeper,
            config: Arc::new(config),
            llm_configured,
            data_dir,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// State over a fresh database in a temp directory, with no LLM credential.
    pub(crate) async fn test_state() -> (AppState, tempfile::TempDir) {
        let tmp = tempfile::TempDir::new().unwrap();
        let db_pool = DatabasePool::new(&database_url(tmp.path())).await.unwrap();
        let state = AppState::from_parts(
            tmp.path().to_path_buf(),
            GlobalConfig::default(),
            db_pool,
            LlmClient::unconfigured(),
        );
        (state, tmp)
    }

    #[tokio::test]
    async fn test_from_parts_shares_chat_service_with_sweeper() {
        let (state, _tmp) = test_state().await;
        assert_eq!(state.sweeper.settings().interval_minutes, 5);
        assert_eq!(Arc::strong_count(&state.chat_service), 2);
        assert!(!state.llm_configured);
    }
}
