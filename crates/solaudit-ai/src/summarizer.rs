use crate::llm_provider::{GenerationConfig, LLMProvider};
use solaudit_core::{LlmConfig, Prompt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// A failed narrative call. The display form is what callers see in place of the summary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{service} call failed: {cause}")]
pub struct SummaryError {
    pub service: String,
    pub cause: String,
}

/// Sends one composed prompt to the configured provider and returns its narrative.
#[derive(Clone)]
pub struct AuditSummarizer {
    provider: Arc<dyn LLMProvider>,
    generation: GenerationConfig,
    timeout: Duration,
}

impl AuditSummarizer {
    pub fn new(provider: Arc<dyn LLMProvider>, generation: GenerationConfig, timeout: Duration) -> Self {
        Self {
            provider,
            generation,
            timeout,
        }
    }

    pub fn from_config(provider: Arc<dyn LLMProvider>, config: &LlmConfig) -> Self {
        Self::new(
            provider,
            GenerationConfig::from_llm_config(config),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    /// One attempt, bounded by the configured timeout. Never panics or retries;
    /// every failure comes back as a `SummaryError`.
    pub async fn summarize(&self, prompt: &Prompt) -> Result<String, SummaryError> {
        let start = Instant::now();
        let service = self.provider.service_name().to_string();

        let call = self
            .provider
            .generate_with_config(prompt.as_str(), &self.generation);

        let cause = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(response)) => {
                let text = response.content.trim();
                if !text.is_empty() {
                    debug!(
                        provider = %self.provider.provider_name(),
                        model = %response.model,
                        total_tokens = ?response.total_tokens,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Narrative summary generated"
                    );
                    return Ok(text.to_string());
                }
                "malformed response: empty completion".to_string()
            }
            // `{:#}` keeps the whole context chain on one line
            Ok(Err(e)) => format!("{:#}", e),
            Err(_) => format!("timed out after {}s", self.timeout.as_secs_f32()),
        };

        warn!(
            provider = %self.provider.provider_name(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            cause = %cause,
            "Narrative summary failed"
        );
        Err(SummaryError { service, cause })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline_provider::BaselineProvider;
    use crate::llm_provider::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider stub that fails every call and counts attempts.
    #[derive(Default)]
    struct FailingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LLMProvider for FailingProvider {
        async fn generate_chat(
            &self,
            _messages: &[Message],
            _config: &GenerationConfig,
        ) -> LLMResult<LLMResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow!("401 Unauthorized").context("Stub API error"))
        }

        fn provider_name(&self) -> &str {
            "stub"
        }

        fn service_name(&self) -> &str {
            "Stub"
        }

        fn model_name(&self) -> &str {
            "stub-model"
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl LLMProvider for SlowProvider {
        async fn generate_chat(
            &self,
            _messages: &[Message],
            _config: &GenerationConfig,
        ) -> LLMResult<LLMResponse> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(anyhow!("unreachable"))
        }

        fn provider_name(&self) -> &str {
            "slow"
        }

        fn model_name(&self) -> &str {
            "slow-model"
        }
    }

    fn summarizer(provider: Arc<dyn LLMProvider>, timeout: Duration) -> AuditSummarizer {
        AuditSummarizer::new(provider, GenerationConfig::default(), timeout)
    }

    #[tokio::test]
    async fn test_success_returns_trimmed_text() {
        let provider = Arc::new(BaselineProvider::with_text("  No significant findings.\n"));
        let summary = summarizer(provider, Duration::from_secs(5))
            .summarize(&Prompt::new("audit this"))
            .await
            .unwrap();
        assert_eq!(summary, "No significant findings.");
    }

    #[tokio::test]
    async fn test_failure_is_described_and_not_retried() {
        let provider = Arc::new(FailingProvider::default());
        let err = summarizer(provider.clone(), Duration::from_secs(5))
            .summarize(&Prompt::new("audit this"))
            .await
            .unwrap_err();

        assert_eq!(err.service, "Stub");
        assert_eq!(
            err.to_string(),
            "Stub call failed: Stub API error: 401 Unauthorized"
        );
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_completion_is_failure() {
        let provider = Arc::new(BaselineProvider::with_text("   "));
        let err = summarizer(provider, Duration::from_secs(5))
            .summarize(&Prompt::new("audit this"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty completion"));
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let err = summarizer(Arc::new(SlowProvider), Duration::from_millis(50))
            .summarize(&Prompt::new("audit this"))
            .await
            .unwrap_err();
        assert_eq!(err.service, "slow");
        assert!(err.cause.starts_with("timed out after"));
    }

    #[cfg(feature = "openai-llm")]
    #[tokio::test]
    async fn test_unreachable_openai_is_failure() {
        use crate::openai_llm_provider::{OpenAIConfig, OpenAIProvider};

        let provider = OpenAIProvider::new(OpenAIConfig {
            api_key: "sk-test".to_string(),
            base_url: "http://127.0.0.1:1/v1".to_string(),
            timeout_secs: 5,
            ..Default::default()
        })
        .unwrap();

        let err = summarizer(Arc::new(provider), Duration::from_secs(10))
            .summarize(&Prompt::new("audit this"))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("OpenAI call failed: "));
    }
}
