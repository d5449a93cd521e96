//! Personality suggestion CLI commands: show, apply, dismiss.

use anyhow::Result;
use console::style;
use uuid::Uuid;

use crate::state::AppState;

pub async fn show(state: &AppState, owner: &str, session_id: Uuid, json: bool) -> Result<()> {
    let suggestion = state
        .chat_service
        .personality_suggestion(owner, session_id)
        .await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "session_id": session_id,
                "suggestion": suggestion,
            }))?
        );
        return Ok(());
    }

    println!();
    match suggestion {
        Some(decision) => {
            println!(
                "  {} Suggested personality change (confidence {:.0}%)",
                style("*").yellow().bold(),
                decision.confidence * 100.0
            );
            println!("  Reason: {}", decision.reason);
            if let Some(text) = &decision.suggested_personality {
                println!();
                println!("  {}", style(text).cyan());
            }
            println!();
            println!(
                "  Apply with {} or discard with {}",
                style(format!("kindred suggestion apply {session_id}")).yellow(),
                style(format!("kindred suggestion dismiss {session_id}")).yellow()
            );
        }
        None => println!(
            "  {} No pending suggestion for this session",
            style("i").blue().bold()
        ),
    }
    println!();
    Ok(())
}

pub async fn apply(state: &AppState, owner: &str, session_id: Uuid, json: bool) -> Result<()> {
    let persona = state
        .chat_service
        .apply_personality_suggestion(owner, session_id)
        .await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "applied": persona.is_some(),
                "persona": persona,
            }))?
        );
        return Ok(());
    }

    println!();
    match persona {
        Some(persona) => println!(
            "  {} Applied to '{}'",
            style("✓").green().bold(),
            style(&persona.name).cyan()
        ),
        None => println!(
            "  {} Nothing to apply",
            style("i").blue().bold()
        ),
    }
    println!();
    Ok(())
}

pub async fn dismiss(state: &AppState, owner: &str, session_id: Uuid, json: bool) -> Result<()> {
    let dismissed = state
        .chat_service
        .dismiss_personality_suggestion(owner, session_id)
        .await?;

    if json {
        println!("{}", serde_json::json!({"dismissed": dismissed}));
    } else if dismissed {
        println!();
        println!("  {} Suggestion dismissed", style("✓").green().bold());
        println!();
    } else {
        println!();
        println!("  {} No pending suggestion", style("i").blue().bold());
        println!();
    }
    Ok(())
}
