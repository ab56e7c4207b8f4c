use crate::baseline_provider::BaselineProvider;
use crate::llm_provider::*;
use anyhow::{anyhow, Result};
use solaudit_core::LlmConfig;
use std::sync::Arc;

#[cfg(feature = "anthropic")]
use crate::anthropic_provider::{AnthropicConfig, AnthropicProvider};

#[cfg(feature = "openai-llm")]
use crate::openai_llm_provider::{OpenAIConfig, OpenAIProvider};

/// Factory for creating LLM providers based on configuration
pub struct LLMProviderFactory;

impl LLMProviderFactory {
    /// Create an LLM provider from configuration. Baseline mode always wins.
    pub fn create_from_config(config: &LlmConfig) -> Result<Arc<dyn LLMProvider>> {
        if config.use_baseline {
            return Ok(Arc::new(BaselineProvider::new()));
        }

        let provider_name = config.provider.to_lowercase();

        match provider_name.as_str() {
            "baseline" => Ok(Arc::new(BaselineProvider::new())),
            #[cfg(feature = "openai-llm")]
            "openai" => Self::create_openai_provider(config),
            #[cfg(feature = "anthropic")]
            "anthropic" => Self::create_anthropic_provider(config),
            _ => Err(anyhow!(
                "Unsupported LLM provider: {}. Available providers: {}",
                provider_name,
                Self::supported_providers().join(", ")
            )),
        }
    }

    /// Create an OpenAI provider
    #[cfg(feature = "openai-llm")]
    fn create_openai_provider(config: &LlmConfig) -> Result<Arc<dyn LLMProvider>> {
        let api_key = config.openai_api_key.clone().ok_or_else(|| {
            anyhow!(
                "OpenAI API key not found. Set 'llm.openai_api_key' in config \
                 or OPENAI_API_KEY environment variable"
            )
        })?;

        let defaults = OpenAIConfig::default();
        let openai_config = OpenAIConfig {
            api_key,
            base_url: config.base_url.clone().unwrap_or(defaults.base_url),
            model: config.model.clone().unwrap_or(defaults.model),
            timeout_secs: config.timeout_secs,
        };

        Ok(Arc::new(OpenAIProvider::new(openai_config)?))
    }

    /// Create an Anthropic Claude provider
    #[cfg(feature = "anthropic")]
    fn create_anthropic_provider(config: &LlmConfig) -> Result<Arc<dyn LLMProvider>> {
        let api_key = config.anthropic_api_key.clone().ok_or_else(|| {
            anyhow!(
                "Anthropic API key not found. Set 'llm.anthropic_api_key' in config \
                 or ANTHROPIC_API_KEY environment variable"
            )
        })?;

        let defaults = AnthropicConfig::default();
        let anthropic_config = AnthropicConfig {
            api_key,
            base_url: config.base_url.clone().unwrap_or(defaults.base_url),
            model: config.model.clone().unwrap_or(defaults.model),
            timeout_secs: config.timeout_secs,
        };

        Ok(Arc::new(AnthropicProvider::new(anthropic_config)?))
    }

    /// Get a list of supported providers (based on enabled features)
    pub fn supported_providers() -> Vec<&'static str> {
        let mut providers = vec!["baseline"];

        #[cfg(feature = "openai-llm")]
        providers.push("openai");

        #[cfg(feature = "anthropic")]
        providers.push("anthropic");

        providers
    }
}
