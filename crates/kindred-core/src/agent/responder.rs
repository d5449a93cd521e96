//! Reply generation.
//!
//! `ResponseGenerator` turns a user message, recent history, and a persona
//! into one or more assistant messages. Without a credential it answers with
//! a fixed simulated reply; provider failures become an apologetic message
//! that is stored like any other reply.

use tracing::warn;

use kindred_types::chat::ChatMessage;
use kindred_types::llm::{CompletionRequest, LlmError, Message};
use kindred_types::persona::Persona;

use crate::llm::client::{LlmClient, operation};

use super::prompt::build_reply_system_prompt;
use super::split::Reply;

/// Messages of history sent along with each reply request.
pub const DEFAULT_HISTORY_WINDOW: usize = 20;

const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_TEMPERATURE: f64 = 0.7;

/// The reply produced when no credential is configured.
pub fn simulated_reply(user_message: &str) -> String {
    format!("Simulated response to: {user_message}")
}

/// Human-readable text shown in place of a reply when the provider fails.
pub fn describe_llm_error(err: &LlmError) -> String {
    match err {
        LlmError::AuthenticationFailed => {
            "Sorry, I couldn't authenticate with the language model service. \
             Please check the API key configuration."
                .to_string()
        }
        LlmError::Connection(_) | LlmError::Timeout(_) => {
            "Sorry, I couldn't reach the language model service right now. \
             Please try again in a moment."
                .to_string()
        }
        LlmError::RateLimited { .. } | LlmError::Overloaded(_) => {
            "Sorry, the language model service is busy right now. Please try again shortly."
                .to_string()
        }
        other => format!("Sorry, something went wrong while generating a response: {other}"),
    }
}

pub struct ResponseGenerator {
    llm: LlmClient,
    history_window: usize,
}

impl ResponseGenerator {
    pub fn new(llm: LlmClient, history_window: usize) -> Self {
        Self {
            llm,
            history_window,
        }
    }

    pub fn history_window(&self) -> usize {
        self.history_window
    }

    /// Produce the reply to `user_message`.
    ///
    /// `history` is the conversation before `user_message`, chronological;
    /// only the last `history_window` entries are sent.
    #[tracing::instrument(
        name = "generate_reply",
        skip(self, user_message, persona, history),
        fields(persona_id = %persona.id, history = history.len())
    )]
    pub async fn generate(
        &self,
        user_message: &str,
        persona: &Persona,
        history: &[ChatMessage],
    ) -> Reply {
        if !self.llm.is_configured() {
            return Reply::Single(simulated_reply(user_message));
        }

        let request = self.build_request(user_message, persona, history);
        match self.llm.complete(&request, operation::REPLY).await {
            Ok(text) if text.is_empty() => {
                warn!("Model returned an empty reply");
                Reply::Single(describe_llm_error(&LlmError::Deserialization(
                    "empty response".to_string(),
                )))
            }
            Ok(text) => Reply::from_model_output(&text),
            Err(err) => {
                warn!(error = %err, "Reply generation failed, storing error text");
                Reply::Single(describe_llm_error(&err))
            }
        }
    }

    fn build_request(
        &self,
        user_message: &str,
        persona: &Persona,
        history: &[ChatMessage],
    ) -> CompletionRequest {
        let skip = history.len().saturating_sub(self.history_window);
        let mut messages: Vec<Message> = history[skip..]
            .iter()
            .map(|m| Message {
                role: m.sender.into(),
                content: m.content.clone(),
            })
            .collect();
        messages.push(Message::user(user_message));

        let temperature = persona
            .parameters
            .get("temperature")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(DEFAULT_TEMPERATURE);
        let max_tokens = persona
            .parameters
            .get("max_tokens")
            .and_then(serde_json::Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(DEFAULT_MAX_TOKENS);

        CompletionRequest {
            model: persona.model.clone(),
            messages,
            system: Some(build_reply_system_prompt(persona)),
            max_tokens,
            temperature: Some(temperature),
        }
    }
}
