//! Configuration and credential resolution.
//!
//! Settings live in `config.toml` under the data directory. A missing or
//! unreadable file is not an error: the engine runs on [`GlobalConfig`]
//! defaults and says so in the log.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

use kindred_core::llm::client::LlmClient;
use kindred_types::config::{GlobalConfig, LlmSettings};
use kindred_types::llm::LlmError;

use crate::llm::create_provider;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "KINDRED_DATA_DIR";

/// Resolve the data directory: `KINDRED_DATA_DIR`, else `~/.kindred`.
pub fn resolve_data_dir() -> PathBuf {
    match std::env::var_os(DATA_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".kindred"),
    }
}

/// Read `{data_dir}/config.toml`, falling back to defaults on any failure.
pub async fn load_global_config(data_dir: &Path) -> GlobalConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %config_path.display(), "config file absent, using defaults");
            return GlobalConfig::default();
        }
        Err(err) => {
            tracing::warn!(path = %config_path.display(), error = %err, "config file unreadable, using defaults");
            return GlobalConfig::default();
        }
    };

    match toml::from_str::<GlobalConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(path = %config_path.display(), error = %err, "config file invalid, using defaults");
            GlobalConfig::default()
        }
    }
}

/// Read the API key from the environment variable named in the settings.
///
/// Unset or blank means no credential, which selects the fallback paths.
pub fn resolve_api_key(settings: &LlmSettings) -> Option<SecretString> {
    api_key_from(std::env::var(&settings.api_key_env).ok())
}

fn api_key_from(value: Option<String>) -> Option<SecretString> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(SecretString::from)
}

/// Build the LLM gateway for the decision components.
///
/// Without a credential the gateway is unconfigured and every component
/// uses its deterministic fallback.
pub fn build_llm_client(settings: &LlmSettings) -> Result<LlmClient, LlmError> {
    client_with_key(settings, resolve_api_key(settings))
}

fn client_with_key(settings: &LlmSettings, api_key: Option<SecretString>) -> Result<LlmClient, LlmError> {
    let Some(api_key) = api_key else {
        tracing::info!(
            env = %settings.api_key_env,
            "No API key configured, using fallback responses"
        );
        return Ok(LlmClient::unconfigured());
    };
    let provider = create_provider(settings, api_key)?;
    Ok(LlmClient::new(provider, Duration::from_secs(settings.timeout_secs)))
}
