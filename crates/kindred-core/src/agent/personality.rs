//! Personality adaptation.
//!
//! `PersonalityAnalyzer` looks at a stretch of conversation and decides
//! whether the persona's personality prompt should change. It only reports a
//! decision; applying it is the orchestrator's job.

use serde::Deserialize;
use tracing::{debug, warn};

use kindred_types::chat::ChatMessage;
use kindred_types::decision::PersonalityDecision;
use kindred_types::llm::{CompletionRequest, Message};

use crate::llm::client::{LlmClient, operation};
use crate::llm::structured::parse_json_lenient;

use super::prompt::{format_transcript, personality_prompt};

/// Below this many messages the analyzer always answers "no update".
pub const PERSONALITY_MIN_MESSAGES: u32 = 20;

/// Messages of recent history the analyzer looks at.
pub const PERSONALITY_WINDOW: usize = 30;

/// Without a model, a generic persona is suggested every this many messages.
pub const HEURISTIC_INTERVAL: u32 = 50;

pub const HEURISTIC_CONFIDENCE: f64 = 0.5;

pub const HEURISTIC_PERSONALITY: &str = "You are a warm, attentive conversational companion. \
Keep replies friendly and concise, and match the user's language and tone.";

const REQUIRED_FIELDS: [&str; 4] = ["should_update", "reason", "suggested_personality", "confidence"];

/// Everything the analyzer needs about a session.
#[derive(Debug, Clone, Copy)]
pub struct PersonalityInput<'a> {
    pub model: &'a str,
    pub message_count: u32,
    pub current_personality: &'a str,
    pub summary: &'a str,
    /// Recent messages, chronological. Only the last [`PERSONALITY_WINDOW`] are used.
    pub recent: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct RawDecision {
    should_update: bool,
    reason: String,
    suggested_personality: Option<String>,
    confidence: f64,
}

impl From<RawDecision> for PersonalityDecision {
    fn from(raw: RawDecision) -> Self {
        let confidence = if raw.confidence.is_finite() {
            raw.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            should_update: raw.should_update,
            reason: raw.reason,
            suggested_personality: raw
                .suggested_personality
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            confidence,
        }
    }
}

/// Parse the model's JSON verdict. All four fields must be present.
pub fn parse_personality_decision(text: &str) -> Option<PersonalityDecision> {
    let object: serde_json::Map<String, serde_json::Value> = parse_json_lenient(text).ok()?;
    if let Some(missing) = REQUIRED_FIELDS.iter().find(|f| !object.contains_key(**f)) {
        debug!(field = missing, "Personality verdict missing a required field");
        return None;
    }
    serde_json::from_value::<RawDecision>(serde_json::Value::Object(object))
        .ok()
        .map(PersonalityDecision::from)
}

/// The no-model rule: suggest a generic persona periodically when none is set.
pub fn heuristic_decision(message_count: u32, current_personality: &str) -> PersonalityDecision {
    if message_count % HEURISTIC_INTERVAL == 0 && current_personality.trim().is_empty() {
        PersonalityDecision {
            should_update: true,
            reason: "No personality is set yet; suggesting a friendly default.".to_string(),
            suggested_personality: Some(HEURISTIC_PERSONALITY.to_string()),
            confidence: HEURISTIC_CONFIDENCE,
        }
    } else {
        PersonalityDecision::no_update("Current personality kept.")
    }
}

pub struct PersonalityAnalyzer {
    llm: LlmClient,
}

impl PersonalityAnalyzer {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    #[tracing::instrument(
        name = "analyze_personality",
        skip(self, input),
        fields(model = %input.model, message_count = input.message_count)
    )]
    pub async fn analyze(&self, input: PersonalityInput<'_>) -> PersonalityDecision {
        if input.message_count < PERSONALITY_MIN_MESSAGES {
            return PersonalityDecision::no_update(format!(
                "Not enough messages yet (need at least {PERSONALITY_MIN_MESSAGES})."
            ));
        }
        if !self.llm.is_configured() {
            return heuristic_decision(input.message_count, input.current_personality);
        }

        let skip = input.recent.len().saturating_sub(PERSONALITY_WINDOW);
        let summary = if input.summary.trim().is_empty() {
            "(none yet)"
        } else {
            input.summary
        };
        let request = CompletionRequest {
            model: input.model.to_string(),
            messages: vec![Message::user(personality_prompt(
                input.current_personality,
                input.message_count,
                summary,
                &format_transcript(&input.recent[skip..]),
            ))],
            system: None,
            max_tokens: 500,
            temperature: Some(0.3),
        };

        match self.llm.complete(&request, operation::ANALYZE_PERSONALITY).await {
            Ok(text) => parse_personality_decision(&text).unwrap_or_else(|| {
                warn!("Personality verdict was not valid JSON, keeping personality");
                PersonalityDecision::no_update("Could not parse the personality analysis.")
            }),
            Err(err) => {
                warn!(error = %err, "Personality analysis failed, keeping personality");
                PersonalityDecision::no_update(format!("Personality analysis failed: {err}"))
            }
        }
    }
}
