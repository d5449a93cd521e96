//! Session management CLI commands: list, show, delete.

use anyhow::Result;
use chrono::{DateTime, Utc};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use uuid::Uuid;

use kindred_types::chat::SenderKind;

use crate::state::AppState;

/// List sessions with their agent, message count, last activity and topic.
///
/// # Examples
///
/// ```bash
/// kindred sessions list
/// kindred sessions list --limit 10 --json
/// ```
pub async fn list_sessions(state: &AppState, owner: &str, limit: i64, json: bool) -> Result<()> {
    let sessions = state
        .chat_service
        .list_sessions(owner, Some(limit), None)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!();
        println!(
            "  {} No sessions yet. Start one with: {}",
            style("i").blue().bold(),
            style("kindred chat \"hello\"").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("ID").fg(Color::White),
        Cell::new("Agent").fg(Color::White),
        Cell::new("Started").fg(Color::White),
        Cell::new("Messages").fg(Color::White),
        Cell::new("Last activity").fg(Color::White),
        Cell::new("Topic").fg(Color::White),
    ]);

    for listing in &sessions {
        let session = &listing.session;
        let topic = if session.summary.is_empty() {
            "(no messages yet)".to_string()
        } else {
            truncate(&session.summary, 40)
        };

        let suggestion_marker = if session.state.has_personality_suggestion() {
            " *"
        } else {
            ""
        };

        table.add_row(vec![
            Cell::new(format!("{}{suggestion_marker}", session.id)).fg(Color::Cyan),
            Cell::new(listing.agent_name.as_deref().unwrap_or("?")).fg(Color::White),
            Cell::new(format_time(&session.started_at)).fg(Color::White),
            Cell::new(session.message_count.to_string()).fg(Color::White),
            Cell::new(
                session
                    .last_activity_at
                    .as_ref()
                    .map(format_time)
                    .unwrap_or_else(|| "never".to_string()),
            )
            .fg(Color::DarkGrey),
            Cell::new(topic).fg(Color::White),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} session{}",
        style(sessions.len()).bold(),
        if sessions.len() == 1 { "" } else { "s" }
    );
    if sessions.iter().any(|s| s.session.state.has_personality_suggestion()) {
        println!(
            "  {} marks a pending personality suggestion ({})",
            style("*").yellow(),
            style("kindred suggestion show <id>").yellow()
        );
    }
    println!();

    Ok(())
}

/// Print a session transcript. Agent messages are marked read.
pub async fn show_session(state: &AppState, owner: &str, session_id: Uuid, json: bool) -> Result<()> {
    let detail = state.chat_service.open_session(owner, session_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    let session = &detail.session;
    println!();
    println!("  Session {}", style(session.id).cyan().bold());
    println!(
        "  Started {}  |  {} messages",
        format_time(&session.started_at),
        session.message_count
    );
    if !session.summary.is_empty() {
        println!("  Topic: {}", style(&session.summary).dim());
    }
    println!();

    for message in &detail.messages {
        let who = match message.sender {
            SenderKind::User => style("you").green().bold(),
            SenderKind::Assistant => style("agent").cyan().bold(),
            SenderKind::Growth => style("agent (check-in)").magenta().bold(),
        };
        println!(
            "  {} {} {}",
            style(message.created_at.format("%H:%M")).dim(),
            who,
            message.content
        );
    }
    println!();

    Ok(())
}

pub async fn delete_session(state: &AppState, owner: &str, session_id: Uuid, json: bool) -> Result<()> {
    state.chat_service.delete_session(owner, session_id).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({"deleted": true, "session_id": session_id})
        );
    } else {
        println!();
        println!(
            "  {} Deleted session {}",
            style("✓").green().bold(),
            style(session_id).cyan()
        );
        println!();
    }
    Ok(())
}

fn format_time(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M").to_string()
}

/// Shorten to at most `max` characters, marking the cut with "...".
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}
