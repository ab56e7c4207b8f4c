use crate::llm_provider::*;
use async_trait::async_trait;

/// Narrative returned when the service runs in baseline mode.
pub const BASELINE_SUMMARY: &str = "This is a simulated audit summary. Detected issues include \
common patterns like reentrancy or unguarded access.";

/// Offline provider that answers every prompt with the same fixed narrative.
///
/// Used for the `use_baseline` test mode and for deterministic tests; it never
/// touches the network.
#[derive(Debug, Clone)]
pub struct BaselineProvider {
    text: String,
}

impl Default for BaselineProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl BaselineProvider {
    pub fn new() -> Self {
        Self::with_text(BASELINE_SUMMARY)
    }

    pub fn with_text(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[async_trait]
impl LLMProvider for BaselineProvider {
    async fn generate_chat(
        &self,
        _messages: &[Message],
        _config: &GenerationConfig,
    ) -> LLMResult<LLMResponse> {
        Ok(LLMResponse {
            content: self.text.clone(),
            total_tokens: None,
            prompt_tokens: None,
            completion_tokens: None,
            finish_reason: Some("stop".to_string()),
            model: self.model_name().to_string(),
        })
    }

    fn provider_name(&self) -> &str {
        "baseline"
    }

    fn service_name(&self) -> &str {
        "Baseline"
    }

    fn model_name(&self) -> &str {
        "fixed-baseline"
    }
}
