//! Global configuration types for Kindred.
//!
//! `GlobalConfig` represents the top-level `config.toml` that selects the LLM
//! provider and tunes the inactivity sweeper and decision engine.

use serde::{Deserialize, Serialize};

use crate::llm::ProviderKind;
use crate::persona::DEFAULT_MODEL;

/// Top-level configuration for the Kindred backend.
///
/// Loaded from `~/.kindred/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub llm: LlmSettings,

    #[serde(default)]
    pub sweeper: SweeperSettings,

    #[serde(default)]
    pub engine: EngineSettings,
}

/// Which provider to call and how long to wait for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default)]
    pub provider: ProviderKind,

    /// Override the provider's default base URL. Required for `custom`.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Model used when a persona is created without one.
    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the API key. Unset or empty means fallback mode.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            base_url: None,
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Background sweep cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperSettings {
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,

    /// Maximum sessions processed at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Also run the daily personality review during sweeps.
    #[serde(default = "default_true")]
    pub personality_review: bool,
}

fn default_interval_minutes() -> u64 {
    5
}

fn default_concurrency() -> usize {
    8
}

fn default_true() -> bool {
    true
}

impl Default for SweeperSettings {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            concurrency: default_concurrency(),
            personality_review: default_true(),
        }
    }
}

/// Thresholds for the session decision engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Messages of history sent with each reply request.
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Personality changes above this confidence are applied without asking.
    #[serde(default = "default_auto_apply_confidence")]
    pub auto_apply_confidence: f64,
}

fn default_history_window() -> usize {
    20
}

fn default_auto_apply_confidence() -> f64 {
    0.8
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            auto_apply_confidence: default_auto_apply_confidence(),
        }
    }
}
