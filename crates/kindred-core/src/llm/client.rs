//! LLM gateway shared by the decision components.
//!
//! `LlmClient` holds an optional provider. When no credential is configured
//! there is no provider, and every component takes its documented fallback
//! path instead of calling out. Every call is bounded by a timeout, and a
//! timeout surfaces as [`LlmError::Timeout`] like any other failure.

use std::sync::Arc;
use std::time::Duration;

use tracing::{Instrument, debug, info_span};

use kindred_types::llm::{CompletionRequest, LlmError};

use super::box_provider::BoxLlmProvider;

/// Operation names recorded on `gen_ai` spans.
pub mod operation {
    pub const REPLY: &str = "chat";
    pub const SUMMARIZE: &str = "summarize_session";
    pub const ANALYZE_PERSONALITY: &str = "analyze_personality";
    pub const PROACTIVE_DECISION: &str = "proactive_decision";
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct LlmClient {
    provider: Option<Arc<BoxLlmProvider>>,
    timeout: Duration,
}

impl LlmClient {
    pub fn new(provider: BoxLlmProvider, timeout: Duration) -> Self {
        Self {
            provider: Some(Arc::new(provider)),
            timeout,
        }
    }

    /// A client with no credential. All components run in fallback mode.
    pub fn unconfigured() -> Self {
        Self {
            provider: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    pub fn provider_name(&self) -> Option<&str> {
        self.provider.as_deref().map(BoxLlmProvider::name)
    }

    /// Send a request and return the trimmed response text.
    ///
    /// Returns [`LlmError::AuthenticationFailed`] when unconfigured; callers
    /// are expected to check [`is_configured`](Self::is_configured) first.
    pub async fn complete(
        &self,
        request: &CompletionRequest,
        operation: &'static str,
    ) -> Result<String, LlmError> {
        let provider = self.provider.as_deref().ok_or(LlmError::AuthenticationFailed)?;

        let span = info_span!(
            "gen_ai.complete",
            gen_ai.operation.name = operation,
            gen_ai.provider.name = provider.name(),
            gen_ai.request.model = %request.model,
            gen_ai.request.max_tokens = request.max_tokens,
            gen_ai.request.temperature = ?request.temperature,
        );

        let call = provider.complete(request).instrument(span);
        let response = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| LlmError::Timeout(self.timeout.as_secs()))??;

        debug!(
            operation,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "LLM call completed"
        );

        Ok(response.content.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;
    use kindred_types::llm::Message;

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "test-model".to_string(),
            messages: vec![Message::user("Hello")],
            system: None,
            max_tokens: 10,
            temperature: None,
        }
    }

    #[tokio::test]
    async fn test_unconfigured_client_refuses() {
        let client = LlmClient::unconfigured();
        assert!(!client.is_configured());
        let err = client.complete(&request(), operation::REPLY).await.unwrap_err();
        assert!(matches!(err, LlmError::AuthenticationFailed));
    }

    #[tokio::test]
    async fn test_response_is_trimmed() {
        let client = ScriptedProvider::new().reply("  hi there \n").into_client();
        let text = client.complete(&request(), operation::REPLY).await.unwrap();
        assert_eq!(text, "hi there");
        assert_eq!(client.provider_name(), Some("scripted"));
    }

    #[tokio::test]
    async fn test_provider_error_passes_through() {
        let client = ScriptedProvider::new()
            .fail(LlmError::RateLimited { retry_after_ms: None })
            .into_client();
        let err = client.complete(&request(), operation::REPLY).await.unwrap_err();
        assert!(matches!(err, LlmError::RateLimited { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_provider_times_out() {
        let client = LlmClient::new(
            BoxLlmProvider::new(ScriptedProvider::new().reply("late").delay(Duration::from_secs(5))),
            Duration::from_secs(1),
        );
        let err = client.complete(&request(), operation::REPLY).await.unwrap_err();
        assert!(matches!(err, LlmError::Timeout(1)));
    }
}
