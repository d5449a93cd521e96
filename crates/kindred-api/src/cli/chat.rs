//! One-shot chat command: send a message, print the agent's reply.

use anyhow::Result;
use console::style;
use uuid::Uuid;

use kindred_core::chat::service::SendMessage;

use crate::state::AppState;

/// Send `message` as `owner` and print the reply.
///
/// # Examples
///
/// ```bash
/// kindred chat "How was your day?"
/// kindred chat --session 0190... "Tell me more"
/// ```
pub async fn send(
    state: &AppState,
    owner: &str,
    message: String,
    session_id: Option<Uuid>,
    persona_id: Option<Uuid>,
    json: bool,
) -> Result<()> {
    let reply = state
        .chat_service
        .send_message(
            owner,
            SendMessage {
                message,
                session_id,
                persona_id,
            },
        )
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&reply)?);
        return Ok(());
    }

    println!();
    match &reply.messages {
        Some(parts) => {
            for part in parts {
                println!("  {} {}", style(">").cyan().bold(), part.message);
            }
        }
        None => println!("  {} {}", style(">").cyan().bold(), reply.response),
    }
    println!();

    if reply.summary_updated {
        if let Some(summary) = &reply.summary {
            println!("  {} Topic: {}", style("i").blue().bold(), style(summary).dim());
        }
    }
    if reply.personality_updated {
        println!(
            "  {} Agent personality was updated from this conversation",
            style("*").yellow().bold()
        );
    }
    if reply.personality_suggestion_available {
        println!(
            "  {} Personality suggestion available: {}",
            style("*").yellow().bold(),
            style(format!("kindred suggestion show {}", reply.session_id)).yellow()
        );
    }
    println!(
        "  {}",
        style(format!("session {}", reply.session_id)).dim()
    );
    println!();

    Ok(())
}
