//! CLI command definitions and dispatch for the `kindred` binary.
//!
//! Uses clap derive macros for argument parsing. Resource commands follow a
//! noun-verb pattern (e.g., `kindred sessions list`, `kindred agents create`).

pub mod agent;
pub mod chat;
pub mod doctor;
pub mod session;
pub mod suggestion;
pub mod sweep;

use clap::{Parser, Subcommand, ValueEnum};
use uuid::Uuid;

use kindred_observe::tracing_setup::LogFormat;
use kindred_types::persona::ProactiveBehavior;

/// Conversational agents that remember, adapt, and check back in.
#[derive(Parser)]
#[command(name = "kindred", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for info, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log line format.
    #[arg(long, value_enum, default_value_t = LogFormatArg::Pretty, global = true)]
    pub log_format: LogFormatArg,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true, env = "KINDRED_OTEL")]
    pub otel: bool,

    /// Owner the command acts for.
    #[arg(long, global = true, env = "KINDRED_USER", default_value = "local")]
    pub user: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API server and the background inactivity sweeper.
    Serve {
        /// Port to listen on.
        #[arg(long, env = "KINDRED_PORT", default_value_t = 3000)]
        port: u16,

        /// Host to bind to.
        #[arg(long, env = "KINDRED_HOST", default_value = "127.0.0.1")]
        host: String,

        /// Do not run the background sweeper.
        #[arg(long)]
        no_sweeper: bool,
    },

    /// Run one inactivity sweep now.
    Sweep,

    /// Send a message and print the reply.
    Chat {
        /// The message text.
        message: String,

        /// Continue an existing session.
        #[arg(long)]
        session: Option<Uuid>,

        /// Talk to a specific agent (defaults to the owner's default agent).
        #[arg(long)]
        agent: Option<Uuid>,
    },

    /// Browse and delete chat sessions.
    #[command(alias = "session")]
    Sessions {
        #[command(subcommand)]
        action: SessionCommand,
    },

    /// Manage agents (personas).
    #[command(alias = "agent")]
    Agents {
        #[command(subcommand)]
        action: AgentCommand,
    },

    /// Review a session's pending personality suggestion.
    Suggestion {
        #[command(subcommand)]
        action: SuggestionCommand,
    },

    /// Check configuration, storage, and the LLM provider.
    Doctor,
}

#[derive(Subcommand)]
pub enum SessionCommand {
    /// List sessions, newest first.
    #[command(alias = "ls")]
    List {
        /// Maximum number of sessions to show.
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },

    /// Show a session with its messages (marks agent messages read).
    Show {
        /// Session ID.
        id: Uuid,
    },

    /// Delete a session.
    #[command(alias = "rm")]
    Delete {
        /// Session ID.
        id: Uuid,
    },
}

#[derive(Subcommand)]
pub enum AgentCommand {
    /// List agents.
    #[command(alias = "ls")]
    List,

    /// Create a new agent.
    Create {
        /// Agent name (unique per owner).
        name: String,

        /// Personality / style prompt.
        #[arg(long, default_value = "")]
        personality: String,

        /// Model identifier (defaults to the configured model).
        #[arg(long)]
        model: Option<String>,

        /// Proactive eagerness: conservative, balanced, or aggressive.
        #[arg(long, default_value = "balanced")]
        proactive: ProactiveBehavior,

        /// Minutes of silence before the agent considers checking in.
        #[arg(long)]
        inactivity_minutes: Option<u32>,
    },

    /// Change an agent's settings. Options left out keep their value.
    Set {
        /// Agent ID.
        id: Uuid,

        /// New name (unique per owner).
        #[arg(long)]
        name: Option<String>,

        /// Model identifier.
        #[arg(long)]
        model: Option<String>,

        /// Proactive eagerness: conservative, balanced, or aggressive.
        #[arg(long)]
        proactive: Option<ProactiveBehavior>,

        /// Minutes of silence before the agent considers checking in.
        #[arg(long)]
        inactivity_minutes: Option<u32>,

        /// Personality / style prompt.
        #[arg(long)]
        personality: Option<String>,
    },

    /// Overwrite an agent's personality text.
    SetPersonality {
        /// Agent ID.
        id: Uuid,

        /// New personality text.
        personality: String,
    },

    /// Delete an agent and all its sessions.
    #[command(alias = "rm")]
    Delete {
        /// Agent ID.
        id: Uuid,
    },
}

#[derive(Subcommand)]
pub enum SuggestionCommand {
    /// Show the pending suggestion for a session.
    Show {
        /// Session ID.
        session: Uuid,
    },

    /// Apply the pending suggestion to the session's agent.
    Apply {
        /// Session ID.
        session: Uuid,
    },

    /// Discard the pending suggestion.
    Dismiss {
        /// Session ID.
        session: Uuid,
    },
}
