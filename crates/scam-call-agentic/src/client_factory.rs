//! Client Factory
//!
//! Builds the text generator for a resolved provider configuration.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::anthropic_client::AnthropicClient;
use crate::backend::LlmProvider;
use crate::gemini_client::GeminiClient;
use crate::llm_client::{GenerationOptions, TextGenerator};
use crate::openai_client::OpenAiClient;

/// Provider, credential and model chosen at process start
#[derive(Clone, PartialEq)]
pub struct ProviderConfig {
    /// Concrete provider, or `Disabled` when no usable key was found
    pub provider: LlmProvider,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderConfig {
    /// Configuration that never reaches a model
    pub fn disabled() -> Self {
        Self {
            provider: LlmProvider::Disabled,
            api_key: None,
            model: "heuristic-only".to_string(),
            timeout: GenerationOptions::default().timeout,
        }
    }

    /// True when a concrete provider and a key are both present
    pub fn is_configured(&self) -> bool {
        matches!(
            self.provider,
            LlmProvider::OpenAi | LlmProvider::Anthropic | LlmProvider::Gemini
        ) && self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

/// Create a text generator sampling at `temperature`.
///
/// Returns `None` when no provider is configured or the client cannot be
/// built; callers then run on heuristics only.
pub fn create_text_generator(
    config: &ProviderConfig,
    temperature: f32,
) -> Option<Arc<dyn TextGenerator>> {
    if !config.is_configured() {
        return None;
    }
    let api_key = config.api_key.clone()?;
    let options = GenerationOptions {
        temperature,
        timeout: config.timeout,
    };

    let built: anyhow::Result<Arc<dyn TextGenerator>> = match config.provider {
        LlmProvider::OpenAi => {
            OpenAiClient::new(api_key, &config.model, options).map(|c| Arc::new(c) as Arc<dyn TextGenerator>)
        }
        LlmProvider::Anthropic => {
            AnthropicClient::new(api_key, &config.model, options).map(|c| Arc::new(c) as Arc<dyn TextGenerator>)
        }
        LlmProvider::Gemini => {
            GeminiClient::new(api_key, &config.model, options).map(|c| Arc::new(c) as Arc<dyn TextGenerator>)
        }
        LlmProvider::Auto | LlmProvider::Disabled => return None,
    };

    match built {
        Ok(generator) => {
            info!(
                "Using {} text generator (model={}, temperature={})",
                generator.provider_name(),
                generator.model_name(),
                temperature
            );
            Some(generator)
        }
        Err(e) => {
            warn!("Failed to build {} client: {}", config.provider, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: LlmProvider, key: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            provider,
            api_key: key.map(str::to_string),
            model: "test-model".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_disabled_yields_no_generator() {
        assert!(create_text_generator(&ProviderConfig::disabled(), 0.1).is_none());
        assert!(create_text_generator(&config(LlmProvider::OpenAi, None), 0.1).is_none());
        assert!(create_text_generator(&config(LlmProvider::Auto, Some("k")), 0.1).is_none());
    }

    #[test]
    fn test_builds_each_provider() {
        for (provider, name) in [
            (LlmProvider::OpenAi, "OpenAI"),
            (LlmProvider::Anthropic, "Anthropic"),
            (LlmProvider::Gemini, "Gemini"),
        ] {
            let generator = create_text_generator(&config(provider, Some("k")), 0.7).unwrap();
            assert_eq!(generator.provider_name(), name);
            assert_eq!(generator.model_name(), "test-model");
        }
    }

    #[test]
    fn test_debug_redacts_key() {
        let rendered = format!("{:?}", config(LlmProvider::Gemini, Some("secret")));
        assert!(!rendered.contains("secret"));
    }
}
