//! Run a single inactivity sweep from the command line.

use anyhow::Result;
use console::style;

use crate::state::AppState;

pub async fn run_once(state: &AppState, json: bool, quiet: bool) -> Result<()> {
    let report = state.sweeper.sweep(chrono::Utc::now()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    if quiet {
        return Ok(());
    }

    println!();
    println!(
        "  {} Swept {} session{}",
        style("✓").green().bold(),
        style(report.scanned).bold(),
        if report.scanned == 1 { "" } else { "s" }
    );
    println!("  Check-ins sent:      {}", style(report.messages_sent).cyan());
    println!("  Waited:              {}", report.waited);
    println!("  Personality reviews: {}", report.personality_reviews);
    if report.failed > 0 {
        println!("  Failed:              {}", style(report.failed).red());
    }
    println!();
    Ok(())
}
