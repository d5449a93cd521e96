//! Kindred CLI and REST API entry point.
//!
//! Binary name: `kindred`
//!
//! Parses CLI arguments, initializes tracing, the database and services, then
//! dispatches to the appropriate command handler or starts the REST API server
//! together with the background inactivity sweeper.

mod cli;
mod http;
mod scheduler;
mod state;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use cli::{AgentCommand, Cli, Commands, SessionCommand, SuggestionCommand};
use kindred_observe::tracing_setup::{init_tracing, shutdown_tracing};
use kindred_types::persona::{PersonaPatch, PersonaTimings};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // --quiet keeps logs at the default (warn) level regardless of -v.
    let verbosity = if cli.quiet { 0 } else { cli.verbose };
    init_tracing(verbosity, cli.log_format.into(), cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let state = AppState::init().await?;
    let owner = cli.user.as_str();

    match cli.command {
        Commands::Serve {
            port,
            host,
            no_sweeper,
        } => {
            serve(state, &host, port, !no_sweeper, cli.quiet).await?;
        }

        Commands::Sweep => {
            cli::sweep::run_once(&state, cli.json, cli.quiet).await?;
        }

        Commands::Chat {
            message,
            session,
            agent,
        } => {
            cli::chat::send(&state, owner, message, session, agent, cli.json).await?;
        }

        Commands::Sessions { action } => match action {
            SessionCommand::List { limit } => {
                cli::session::list_sessions(&state, owner, limit, cli.json).await?;
            }
            SessionCommand::Show { id } => {
                cli::session::show_session(&state, owner, id, cli.json).await?;
            }
            SessionCommand::Delete { id } => {
                cli::session::delete_session(&state, owner, id, cli.json).await?;
            }
        },

        Commands::Agents { action } => match action {
            AgentCommand::List => {
                cli::agent::list_agents(&state, owner, cli.json).await?;
            }
            AgentCommand::Create {
                name,
                personality,
                model,
                proactive,
                inactivity_minutes,
            } => {
                let args = cli::agent::CreateAgentArgs {
                    name,
                    personality,
                    model,
                    proactive,
                    inactivity_minutes,
                };
                cli::agent::create_agent(&state, owner, args, cli.json).await?;
            }
            AgentCommand::Set {
                id,
                name,
                model,
                proactive,
                inactivity_minutes,
                personality,
            } => {
                let patch = PersonaPatch {
                    name,
                    model,
                    personality_prompt: personality,
                    parameters: None,
                    timings: inactivity_minutes.map(|minutes| PersonaTimings {
                        inactivity_threshold_minutes: Some(minutes),
                    }),
                    proactive_behavior: proactive,
                };
                cli::agent::set_agent(&state, owner, id, patch, cli.json).await?;
            }
            AgentCommand::SetPersonality { id, personality } => {
                cli::agent::set_personality(&state, owner, id, personality, cli.json).await?;
            }
            AgentCommand::Delete { id } => {
                cli::agent::delete_agent(&state, owner, id, cli.json).await?;
            }
        },

        Commands::Suggestion { action } => match action {
            SuggestionCommand::Show { session } => {
                cli::suggestion::show(&state, owner, session, cli.json).await?;
            }
            SuggestionCommand::Apply { session } => {
                cli::suggestion::apply(&state, owner, session, cli.json).await?;
            }
            SuggestionCommand::Dismiss { session } => {
                cli::suggestion::dismiss(&state, owner, session, cli.json).await?;
            }
        },

        Commands::Doctor => {
            cli::doctor::doctor(&state, owner, cli.json).await?;
        }
    }

    Ok(())
}

async fn serve(
    state: AppState,
    host: &str,
    port: u16,
    with_sweeper: bool,
    quiet: bool,
) -> anyhow::Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let cancel = CancellationToken::new();
    let sweeper_task = with_sweeper
        .then(|| scheduler::spawn_sweep_loop(state.sweeper.clone(), cancel.clone()));

    if !quiet {
        println!(
            "  {} Kindred API listening on {}",
            console::style("⚡").bold(),
            console::style(format!("http://{addr}")).cyan()
        );
        if !state.llm_configured {
            println!(
                "  {}",
                console::style(format!(
                    "No API key in ${}: agents reply with fallback text",
                    state.config.llm.api_key_env
                ))
                .yellow()
            );
        }
        println!("  {}", console::style("Press Ctrl+C to stop").dim());
    }

    let router = http::router::build_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    if let Some(task) = sweeper_task {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "Sweeper task ended abnormally");
        }
    }

    if !quiet {
        println!("\n  Server stopped.");
    }
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
