//! Proactive re-engagement decisions.
//!
//! Given how long a session has been idle and whether the user has unread
//! agent messages, `ProactiveEngine` chooses `wait`, `continue`, or
//! `new_topic`. Rules are evaluated in order and the first match wins:
//!
//! 1. no recorded activity: wait
//! 2. any unread agent message: wait
//! 3. idle for less than the persona's threshold: wait
//! 4. no model: wait for short conversations, otherwise continue
//! 5. ask the model; anything unusable becomes wait
//!
//! The engine is pure with respect to storage.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use kindred_types::chat::ChatMessage;
use kindred_types::decision::{ProactiveAction, ProactiveDecision};
use kindred_types::llm::{CompletionRequest, Message};
use kindred_types::persona::ProactiveBehavior;

use crate::llm::client::{LlmClient, operation};
use crate::llm::structured::parse_json_lenient;

use super::prompt::{format_transcript, proactive_prompt};

/// Without a model, conversations shorter than this are left alone.
pub const FALLBACK_MIN_MESSAGES: u32 = 5;

/// Messages of recent history shown to the model.
pub const PROACTIVE_WINDOW: usize = 10;

pub const FALLBACK_CONTINUE_MESSAGE: &str =
    "Just checking in. Is there anything else on your mind you'd like to talk about?";

/// Inputs for one proactive decision.
#[derive(Debug, Clone, Copy)]
pub struct ProactiveContext<'a> {
    pub model: &'a str,
    pub summary: &'a str,
    pub message_count: u32,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
    pub threshold_minutes: u32,
    pub unread_count: u32,
    pub behavior: ProactiveBehavior,
    /// Recent messages, chronological. May be empty when only the pre-check is needed.
    pub recent: &'a [ChatMessage],
}

impl ProactiveContext<'_> {
    /// Minutes since the last user activity, if any was recorded.
    pub fn minutes_inactive(&self) -> Option<f64> {
        self.last_activity_at
            .map(|at| (self.now - at).num_milliseconds() as f64 / 60_000.0)
    }
}

#[derive(Debug, Deserialize)]
struct RawDecision {
    action: String,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    suggested_message: Option<String>,
}

/// Parse the model's JSON verdict, coercing anything unusable to `wait`.
pub fn parse_proactive_decision(text: &str) -> ProactiveDecision {
    let raw = match parse_json_lenient::<RawDecision>(text) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(error = %err, "Proactive verdict was not valid JSON");
            return ProactiveDecision::wait(format!("Could not parse the proactive decision: {err}"));
        }
    };
    let action = match raw.action.parse::<ProactiveAction>() {
        Ok(action) => action,
        Err(_) => {
            warn!(action = %raw.action, "Model chose an unknown proactive action");
            return ProactiveDecision::wait(format!(
                "Invalid action '{}' from the model; waiting instead.",
                raw.action
            ));
        }
    };
    ProactiveDecision {
        action,
        reason: raw.reason.unwrap_or_default(),
        suggested_message: raw
            .suggested_message
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
    }
}

pub struct ProactiveEngine {
    llm: LlmClient,
}

impl ProactiveEngine {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    /// Rules 1 to 3, which need neither the model nor message history.
    ///
    /// Returns `Some(wait)` when one of them applies.
    pub fn pre_check(ctx: &ProactiveContext<'_>) -> Option<ProactiveDecision> {
        let Some(minutes) = ctx.minutes_inactive() else {
            return Some(ProactiveDecision::wait("No activity recorded."));
        };
        if ctx.unread_count > 0 {
            return Some(ProactiveDecision::wait(format!(
                "User has {} unread message(s); waiting until they catch up.",
                ctx.unread_count
            )));
        }
        if minutes < f64::from(ctx.threshold_minutes) {
            return Some(ProactiveDecision::wait(format!(
                "Only {minutes:.1} minute(s) inactive; threshold is {}.",
                ctx.threshold_minutes
            )));
        }
        None
    }

    /// The no-model rule. Ignores the proactivity preference.
    pub fn fallback_decision(message_count: u32) -> ProactiveDecision {
        if message_count < FALLBACK_MIN_MESSAGES {
            ProactiveDecision::wait("Conversation too short to follow up.")
        } else {
            ProactiveDecision {
                action: ProactiveAction::Continue,
                reason: "User has been inactive past the threshold.".to_string(),
                suggested_message: Some(FALLBACK_CONTINUE_MESSAGE.to_string()),
            }
        }
    }

    #[tracing::instrument(
        name = "proactive_decision",
        skip(self, ctx),
        fields(message_count = ctx.message_count, unread = ctx.unread_count)
    )]
    pub async fn decide(&self, ctx: &ProactiveContext<'_>) -> ProactiveDecision {
        if let Some(wait) = Self::pre_check(ctx) {
            return wait;
        }
        if !self.llm.is_configured() {
            return Self::fallback_decision(ctx.message_count);
        }

        let minutes = ctx.minutes_inactive().unwrap_or_default();
        let skip = ctx.recent.len().saturating_sub(PROACTIVE_WINDOW);
        let summary = if ctx.summary.trim().is_empty() {
            "(none yet)"
        } else {
            ctx.summary
        };
        let request = CompletionRequest {
            model: ctx.model.to_string(),
            messages: vec![Message::user(proactive_prompt(
                summary,
                ctx.message_count,
                minutes,
                ctx.behavior,
                ctx.unread_count,
                &format_transcript(&ctx.recent[skip..]),
            ))],
            system: None,
            max_tokens: 300,
            temperature: Some(0.5),
        };

        match self.llm.complete(&request, operation::PROACTIVE_DECISION).await {
            Ok(text) => parse_proactive_decision(&text),
            Err(err) => {
                warn!(error = %err, "Proactive decision failed, waiting");
                ProactiveDecision::wait(format!("Proactive decision failed: {err}"))
            }
        }
    }
}
