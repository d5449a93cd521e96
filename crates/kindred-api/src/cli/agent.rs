//! Agent (persona) CLI commands: list, create, set, set-personality, delete.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use uuid::Uuid;

use kindred_types::persona::{NewPersona, Persona, PersonaPatch, PersonaTimings, ProactiveBehavior};

use crate::state::AppState;

pub async fn list_agents(state: &AppState, owner: &str, json: bool) -> Result<()> {
    let personas = state.chat_service.list_personas(owner).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&personas)?);
        return Ok(());
    }

    if personas.is_empty() {
        println!();
        println!(
            "  {} No agents yet. One named 'default' is created on your first chat, or run: {}",
            style("i").blue().bold(),
            style("kindred agents create <name>").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Name").fg(Color::White),
        Cell::new("ID").fg(Color::White),
        Cell::new("Model").fg(Color::White),
        Cell::new("Proactive").fg(Color::White),
        Cell::new("Idle after").fg(Color::White),
    ]);

    for persona in &personas {
        let behavior_color = match persona.proactive_behavior {
            ProactiveBehavior::Conservative => Color::DarkGrey,
            ProactiveBehavior::Balanced => Color::Green,
            ProactiveBehavior::Aggressive => Color::Yellow,
        };
        table.add_row(vec![
            Cell::new(&persona.name).fg(Color::Cyan),
            Cell::new(persona.id.to_string()).fg(Color::DarkGrey),
            Cell::new(&persona.model).fg(Color::White),
            Cell::new(persona.proactive_behavior.to_string()).fg(behavior_color),
            Cell::new(format!("{} min", persona.timings.inactivity_threshold())).fg(Color::White),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

pub struct CreateAgentArgs {
    pub name: String,
    pub personality: String,
    pub model: Option<String>,
    pub proactive: ProactiveBehavior,
    pub inactivity_minutes: Option<u32>,
}

pub async fn create_agent(
    state: &AppState,
    owner: &str,
    args: CreateAgentArgs,
    json: bool,
) -> Result<()> {
    let new = NewPersona {
        name: args.name,
        model: args.model.unwrap_or_else(|| state.config.llm.model.clone()),
        personality_prompt: args.personality,
        parameters: serde_json::Map::new(),
        timings: PersonaTimings {
            inactivity_threshold_minutes: args.inactivity_minutes,
        },
        proactive_behavior: args.proactive,
    };
    let persona = state.chat_service.create_persona(owner, new).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&persona)?);
    } else {
        print_persona("Created agent", &persona);
    }
    Ok(())
}

/// Apply a partial edit to an agent.
///
/// # Examples
///
/// ```bash
/// kindred agents set <id> --inactivity-minutes 30 --proactive conservative
/// ```
pub async fn set_agent(
    state: &AppState,
    owner: &str,
    persona_id: Uuid,
    patch: PersonaPatch,
    json: bool,
) -> Result<()> {
    let persona = state.chat_service.update_persona(owner, persona_id, patch).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&persona)?);
    } else {
        print_persona("Updated agent", &persona);
        println!(
            "  Proactive:   {} after {} min idle",
            persona.proactive_behavior,
            persona.timings.inactivity_threshold()
        );
        println!();
    }
    Ok(())
}

pub async fn set_personality(
    state: &AppState,
    owner: &str,
    persona_id: Uuid,
    personality: String,
    json: bool,
) -> Result<()> {
    let persona = state
        .chat_service
        .update_personality(owner, persona_id, personality)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&persona)?);
    } else {
        print_persona("Updated personality for", &persona);
    }
    Ok(())
}

pub async fn delete_agent(state: &AppState, owner: &str, persona_id: Uuid, json: bool) -> Result<()> {
    state.chat_service.delete_persona(owner, persona_id).await?;

    if json {
        println!("{}", serde_json::json!({"deleted": true, "agent_id": persona_id}));
    } else {
        println!();
        println!(
            "  {} Deleted agent {} and its sessions",
            style("✓").green().bold(),
            style(persona_id).cyan()
        );
        println!();
    }
    Ok(())
}

fn print_persona(headline: &str, persona: &Persona) {
    println!();
    println!(
        "  {} {} '{}'",
        style("✓").green().bold(),
        headline,
        style(&persona.name).cyan().bold()
    );
    println!("  ID:          {}", style(persona.id).dim());
    println!("  Model:       {}", persona.model);
    if !persona.personality_prompt.is_empty() {
        println!("  Personality: {}", persona.personality_prompt);
    }
    println!();
}
