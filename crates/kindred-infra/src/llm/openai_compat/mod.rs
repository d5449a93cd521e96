//! OpenAI-compatible LLM provider implementation.
//!
//! A single [`OpenAiCompatibleProvider`] serves OpenAI, Google Gemini, Mistral,
//! and any custom endpoint speaking the chat completions protocol, via
//! configurable base URLs and factory functions.

pub mod config;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestAssistantMessageContent,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest, FinishReason,
};
use async_openai::error::{ApiError, OpenAIError};
use secrecy::{ExposeSecret, SecretString};

use kindred_core::llm::provider::LlmProvider;
use kindred_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, Message, MessageRole, StopReason, Usage,
};

use self::config::OpenAiCompatConfig;

/// Unified provider for any OpenAI-compatible API.
///
/// Does not derive Debug: the `async_openai::Client` holds the API key.
pub struct OpenAiCompatibleProvider {
    client: Client<OpenAIConfig>,
    provider_name: String,
    model: String,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: OpenAiCompatConfig) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(config.api_key.expose_secret())
            .with_api_base(&config.base_url);

        Self {
            client: Client::with_config(openai_config),
            provider_name: config.provider_name,
            model: config.model,
        }
    }

    pub fn openai(api_key: SecretString, model: &str) -> Self {
        Self::new(config::openai_defaults(api_key, model))
    }

    pub fn gemini(api_key: SecretString, model: &str) -> Self {
        Self::new(config::gemini_defaults(api_key, model))
    }

    pub fn mistral(api_key: SecretString, model: &str) -> Self {
        Self::new(config::mistral_defaults(api_key, model))
    }

    /// Translate a completion request into the chat completions wire format.
    ///
    /// An empty `request.model` selects the provider's configured model.
    fn build_request(&self, request: &CompletionRequest) -> CreateChatCompletionRequest {
        let system = request.system.iter().map(|text| system_message(text.clone()));
        let conversation = request.messages.iter().map(to_wire_message);

        CreateChatCompletionRequest {
            model: if request.model.is_empty() {
                self.model.clone()
            } else {
                request.model.clone()
            },
            messages: system.chain(conversation).collect(),
            max_completion_tokens: Some(request.max_tokens),
            temperature: request.temperature.map(|t| t as f32),
            ..Default::default()
        }
    }
}

fn system_message(content: String) -> ChatCompletionRequestMessage {
    ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
        content: ChatCompletionRequestSystemMessageContent::Text(content),
        name: None,
    })
}

fn to_wire_message(message: &Message) -> ChatCompletionRequestMessage {
    let text = message.content.clone();
    match message.role {
        MessageRole::System => system_message(text),
        MessageRole::User => ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
            content: ChatCompletionRequestUserMessageContent::Text(text),
            name: None,
        }),
        #[allow(deprecated)]
        MessageRole::Assistant => {
            ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                content: Some(ChatCompletionRequestAssistantMessageContent::Text(text)),
                refusal: None,
                name: None,
                audio: None,
                tool_calls: None,
                function_call: None,
            })
        }
    }
}

fn stop_reason(finish: Option<&FinishReason>) -> StopReason {
    match finish {
        Some(FinishReason::Length) => StopReason::MaxTokens,
        Some(FinishReason::ContentFilter) => StopReason::ContentFilter,
        _ => StopReason::EndTurn,
    }
}

impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let response = self
            .client
            .chat()
            .create(self.build_request(request))
            .await
            .map_err(into_llm_error)?;

        let (content, finish) = match response.choices.into_iter().next() {
            Some(choice) => (choice.message.content.unwrap_or_default(), choice.finish_reason),
            None => (String::new(), None),
        };
        let usage = response.usage.map_or_else(Usage::default, |u| Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        });

        Ok(CompletionResponse {
            id: response.id,
            content,
            model: response.model,
            stop_reason: stop_reason(finish.as_ref()),
            usage,
        })
    }
}

/// Classify an API error body by its `code`, `type` and message text.
fn classify_api_error(api_err: &ApiError) -> Option<LlmError> {
    let code = api_err.code.as_deref().unwrap_or_default();
    let kind = api_err.r#type.as_deref().unwrap_or_default();
    let bad_key = api_err.message.to_ascii_lowercase().contains("api key");

    match (code, kind) {
        ("invalid_api_key", _) | (_, "authentication_error") => Some(LlmError::AuthenticationFailed),
        _ if bad_key => Some(LlmError::AuthenticationFailed),
        ("rate_limit_exceeded", _) | (_, "rate_limit_error") => {
            Some(LlmError::RateLimited { retry_after_ms: None })
        }
        ("server_error", _) | (_, "overloaded_error") => {
            Some(LlmError::Overloaded(api_err.message.clone()))
        }
        _ => None,
    }
}

fn into_llm_error(err: OpenAIError) -> LlmError {
    let classified = match &err {
        OpenAIError::ApiError(api_err) => classify_api_error(api_err),
        OpenAIError::Reqwest(http_err) => Some(match http_err.status().map(|s| s.as_u16()) {
            None => LlmError::Connection(err.to_string()),
            Some(401 | 403) => LlmError::AuthenticationFailed,
            Some(429) => LlmError::RateLimited { retry_after_ms: None },
            Some(502..=504 | 529) => LlmError::Overloaded(err.to_string()),
            Some(_) => LlmError::Provider { message: err.to_string() },
        }),
        OpenAIError::JSONDeserialize(_, body) => {
            Some(LlmError::Deserialization(format!("unreadable completion body: {body}")))
        }
        OpenAIError::InvalidArgument(reason) => Some(LlmError::InvalidRequest(reason.clone())),
        _ => None,
    };
    classified.unwrap_or_else(|| LlmError::Provider { message: err.to_string() })
}
