//! Environment diagnostics: data directory, storage, and LLM provider.

use anyhow::Result;
use console::style;

use kindred_infra::config::resolve_api_key;
use kindred_infra::llm::{create_provider, test_provider_connection};

use crate::state::AppState;

pub async fn doctor(state: &AppState, owner: &str, json: bool) -> Result<()> {
    let config_path = state.data_dir.join("config.toml");
    let has_config = tokio::fs::try_exists(&config_path).await.unwrap_or(false);

    let storage = state
        .chat_service
        .list_sessions(owner, Some(1), None)
        .await
        .map(|_| ())
        .map_err(|e| e.to_string());

    let llm = &state.config.llm;
    let provider = match resolve_api_key(llm) {
        None => ProviderStatus::Unconfigured,
        Some(key) => match create_provider(llm, key) {
            Err(e) => ProviderStatus::Failed(e.to_string()),
            Ok(provider) => match test_provider_connection(&provider).await {
                Ok(()) => ProviderStatus::Reachable,
                Err(e) => ProviderStatus::Failed(e.to_string()),
            },
        },
    };

    if json {
        let report = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "data_dir": state.data_dir.display().to_string(),
            "config_file": has_config,
            "storage": storage.as_ref().map(|_| "ok").unwrap_or("error"),
            "storage_error": storage.as_ref().err(),
            "provider": llm.provider.to_string(),
            "model": llm.model,
            "llm": provider.label(),
            "llm_error": provider.error(),
            "sweeper_interval_minutes": state.config.sweeper.interval_minutes,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let mark = |ok: bool| {
        if ok {
            format!("{}", style("✓").green())
        } else {
            format!("{}", style("✗").red())
        }
    };

    println!();
    println!("  Kindred v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("  {} Data directory: {}", mark(true), state.data_dir.display());
    println!(
        "  {} config.toml {}",
        mark(has_config),
        if has_config { "found" } else { "not found, using defaults" }
    );
    match &storage {
        Ok(()) => println!("  {} Database reachable", mark(true)),
        Err(e) => println!("  {} Database error: {e}", mark(false)),
    }
    match &provider {
        ProviderStatus::Reachable => println!(
            "  {} {} provider reachable (model {})",
            mark(true),
            llm.provider,
            llm.model
        ),
        ProviderStatus::Unconfigured => println!(
            "  {} No API key in ${}; agents reply with fallback text",
            style("!").yellow(),
            llm.api_key_env
        ),
        ProviderStatus::Failed(e) => println!("  {} {} provider failed: {e}", mark(false), llm.provider),
    }
    println!(
        "  {} Sweeper runs every {} min",
        mark(true),
        state.config.sweeper.interval_minutes
    );
    println!();
    Ok(())
}

enum ProviderStatus {
    Reachable,
    Unconfigured,
    Failed(String),
}

impl ProviderStatus {
    fn label(&self) -> &'static str {
        match self {
            ProviderStatus::Reachable => "ok",
            ProviderStatus::Unconfigured => "fallback",
            ProviderStatus::Failed(_) => "error",
        }
    }

    fn error(&self) -> Option<&str> {
        match self {
            ProviderStatus::Failed(e) => Some(e),
            _ => None,
        }
    }
}
