//! LLM provider implementations.
//!
//! Provides a provider factory ([`create_provider`]) that constructs the right
//! OpenAI-compatible provider from [`LlmSettings`], and a connection test
//! ([`test_provider_connection`]) used by `kindred doctor`.

pub mod openai_compat;

use secrecy::SecretString;

use kindred_core::llm::box_provider::BoxLlmProvider;
use kindred_types::config::LlmSettings;
use kindred_types::llm::{CompletionRequest, LlmError, Message, ProviderKind};

use self::openai_compat::OpenAiCompatibleProvider;
use self::openai_compat::config::OpenAiCompatConfig;

/// Create a [`BoxLlmProvider`] from the configured settings.
///
/// An explicit `base_url` overrides the well-known endpoint of the chosen
/// provider. `custom` has no well-known endpoint and requires one.
pub fn create_provider(settings: &LlmSettings, api_key: SecretString) -> Result<BoxLlmProvider, LlmError> {
    let model = settings.model.as_str();

    let provider = match (settings.provider, settings.base_url.as_deref()) {
        (kind, Some(base_url)) => OpenAiCompatibleProvider::new(OpenAiCompatConfig {
            provider_name: kind.to_string(),
            base_url: base_url.to_string(),
            api_key,
            model: model.to_string(),
        }),
        (ProviderKind::OpenAi, None) => OpenAiCompatibleProvider::openai(api_key, model),
        (ProviderKind::Gemini, None) => OpenAiCompatibleProvider::gemini(api_key, model),
        (ProviderKind::Mistral, None) => OpenAiCompatibleProvider::mistral(api_key, model),
        (ProviderKind::Custom, None) => {
            return Err(LlmError::InvalidRequest(
                "provider 'custom' requires llm.base_url".to_string(),
            ));
        }
    };
    Ok(BoxLlmProvider::new(provider))
}

/// Test provider connectivity by sending a minimal completion request.
///
/// Sends a tiny "Hello" message with a minimal token budget.
pub async fn test_provider_connection(provider: &BoxLlmProvider) -> Result<(), LlmError> {
    let request = CompletionRequest {
        // Provider uses its configured default
        model: String::new(),
        messages: vec![Message::user("Hello")],
        system: None,
        max_tokens: 10,
        temperature: Some(0.0),
    };
    provider.complete(&request).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SecretString {
        SecretString::from("sk-test".to_string())
    }

    #[test]
    fn test_create_named_providers() {
        for (kind, name) in [
            (ProviderKind::OpenAi, "openai"),
            (ProviderKind::Gemini, "gemini"),
            (ProviderKind::Mistral, "mistral"),
        ] {
            let settings = LlmSettings {
                provider: kind,
                ..LlmSettings::default()
            };
            let provider = create_provider(&settings, key()).unwrap();
            assert_eq!(provider.name(), name);
        }
    }

    #[test]
    fn test_custom_requires_base_url() {
        let settings = LlmSettings {
            provider: ProviderKind::Custom,
            ..LlmSettings::default()
        };
        assert!(matches!(
            create_provider(&settings, key()),
            Err(LlmError::InvalidRequest(_))
        ));

        let settings = LlmSettings {
            provider: ProviderKind::Custom,
            base_url: Some("http://localhost:11434/v1".to_string()),
            ..LlmSettings::default()
        };
        assert_eq!(create_provider(&settings, key()).unwrap().name(), "custom");
    }
}
