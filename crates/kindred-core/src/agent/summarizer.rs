//! Running topic summaries for sessions.
//!
//! The orchestrator calls `Summarizer::summarize` every tenth message. The
//! result is always a short single line: the model's topic when available,
//! otherwise the opening user message.

use tracing::warn;

use kindred_types::chat::{ChatMessage, SenderKind};
use kindred_types::llm::{CompletionRequest, Message};

use crate::llm::client::{LlmClient, operation};

use super::prompt::{SUMMARY_SYSTEM_PROMPT, format_transcript, summary_prompt};

pub const SUMMARY_MAX_CHARS: usize = 100;

/// Length of the opening user message kept by the fallback summary.
pub const FALLBACK_SUMMARY_CHARS: usize = 50;

/// Summary used when a session has no messages at all.
pub const EMPTY_SUMMARY: &str = "New conversation";

const ELLIPSIS: &str = "...";

/// Cut `text` to at most `max_chars` characters, ending in `...` when cut.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

/// The deterministic summary: the first user message, shortened.
pub fn fallback_summary(messages: &[ChatMessage]) -> String {
    let first_user = messages
        .iter()
        .find(|m| m.sender == SenderKind::User)
        .or_else(|| messages.first());
    match first_user {
        Some(message) => {
            let text = message.content.trim();
            if text.chars().count() > FALLBACK_SUMMARY_CHARS {
                let head: String = text.chars().take(FALLBACK_SUMMARY_CHARS).collect();
                format!("{head}{ELLIPSIS}")
            } else {
                text.to_string()
            }
        }
        None => EMPTY_SUMMARY.to_string(),
    }
}

pub struct Summarizer {
    llm: LlmClient,
}

impl Summarizer {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    /// Produce an updated topic line of at most [`SUMMARY_MAX_CHARS`] characters.
    #[tracing::instrument(
        name = "summarize_session",
        skip(self, messages, previous_summary),
        fields(model = %model, message_count = messages.len())
    )]
    pub async fn summarize(
        &self,
        model: &str,
        messages: &[ChatMessage],
        previous_summary: &str,
    ) -> String {
        if messages.is_empty() {
            return EMPTY_SUMMARY.to_string();
        }
        if !self.llm.is_configured() {
            return fallback_summary(messages);
        }

        let request = CompletionRequest {
            model: model.to_string(),
            messages: vec![Message::user(summary_prompt(
                previous_summary,
                &format_transcript(messages),
            ))],
            system: Some(SUMMARY_SYSTEM_PROMPT.to_string()),
            max_tokens: 100,
            temperature: Some(0.3),
        };

        match self.llm.complete(&request, operation::SUMMARIZE).await {
            Ok(text) => {
                let topic = text.trim().trim_matches(|c| c == '"' || c == '\'').trim();
                if topic.is_empty() {
                    warn!("Model returned an empty summary, using fallback");
                    return fallback_summary(messages);
                }
                truncate_with_ellipsis(topic, SUMMARY_MAX_CHARS)
            }
            Err(err) => {
                warn!(error = %err, "Summary generation failed, using fallback");
                fallback_summary(messages)
            }
        }
    }
}
