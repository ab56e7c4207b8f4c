use crate::metrics::PipelineMetrics;
use crate::pipeline::AnalysisPipeline;
use anyhow::Context;
use solaudit_ai::{LLMProvider, LLMProviderFactory};
use solaudit_core::AuditConfig;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AuditConfig>,
    pub pipeline: Arc<AnalysisPipeline>,
    pub metrics: Arc<PipelineMetrics>,
}

impl AppState {
    pub fn new(config: AuditConfig) -> anyhow::Result<Self> {
        let provider = LLMProviderFactory::create_from_config(&config.llm)
            .context("failed to create LLM provider")?;
        Self::with_provider(config, provider)
    }

    /// Build the state around an explicit summary provider.
    pub fn with_provider(
        config: AuditConfig,
        provider: Arc<dyn LLMProvider>,
    ) -> anyhow::Result<Self> {
        info!(
            provider = provider.provider_name(),
            model = provider.model_name(),
            "LLM provider ready"
        );

        let metrics = Arc::new(PipelineMetrics::new().context("failed to register metrics")?);
        let pipeline = AnalysisPipeline::from_config(&config, provider, metrics.clone())
            .context("failed to build analysis pipeline")?;

        Ok(Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            metrics,
        })
    }
}
