use crate::metrics::PipelineMetrics;
use solaudit_ai::{AuditSummarizer, LLMProvider, PromptTemplate};
use solaudit_analyzer::{ScratchFileManager, StaticAnalysisRunner};
use solaudit_core::{
    AnalysisRequest, AnalysisResponse, AuditConfig, Result, StaticReport, SummaryResult,
};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

/// Lifecycle of one analyze request. `Rejected` is the only early exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Received,
    Validated,
    Analyzing,
    Composing,
    Summarizing,
    Completed,
    Rejected,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Received => "received",
            PipelineStage::Validated => "validated",
            PipelineStage::Analyzing => "analyzing",
            PipelineStage::Composing => "composing",
            PipelineStage::Summarizing => "summarizing",
            PipelineStage::Completed => "completed",
            PipelineStage::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// Sequences validation, static analysis, prompt composition and summarization.
///
/// Holds no per-request state; every run owns its own request, scratch file and report.
pub struct AnalysisPipeline {
    scratch: ScratchFileManager,
    runner: StaticAnalysisRunner,
    template: PromptTemplate,
    summarizer: AuditSummarizer,
    metrics: Arc<PipelineMetrics>,
}

impl AnalysisPipeline {
    pub fn new(
        scratch: ScratchFileManager,
        runner: StaticAnalysisRunner,
        template: PromptTemplate,
        summarizer: AuditSummarizer,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            scratch,
            runner,
            template,
            summarizer,
            metrics,
        }
    }

    /// Build every stage from the start-up configuration.
    pub fn from_config(
        config: &AuditConfig,
        provider: Arc<dyn LLMProvider>,
        metrics: Arc<PipelineMetrics>,
    ) -> Result<Self> {
        Ok(Self::new(
            ScratchFileManager::from_config(&config.analyzer),
            StaticAnalysisRunner::from_config(&config.analyzer),
            PromptTemplate::from_config(&config.llm)?,
            AuditSummarizer::from_config(provider, &config.llm),
            metrics,
        ))
    }

    /// Validate a raw request body and run the pipeline.
    ///
    /// Returns `InvalidInput` without touching any downstream stage when the
    /// body carries no source text.
    pub async fn analyze(&self, body: &[u8]) -> Result<AnalysisResponse> {
        self.metrics.analyze_requests.inc();
        debug!(stage = %PipelineStage::Received, bytes = body.len());

        match AnalysisRequest::from_json(body) {
            Ok(request) => self.run(&request).await,
            Err(e) => {
                self.metrics.analyze_rejected.inc();
                info!(stage = %PipelineStage::Rejected, reason = %e, "Analyze request rejected");
                Err(e)
            }
        }
    }

    /// Run every stage for an already validated request.
    pub async fn run(&self, request: &AnalysisRequest) -> Result<AnalysisResponse> {
        let request_id = Uuid::new_v4();
        let span = info_span!("analysis", %request_id);

        async move {
            let start = Instant::now();
            debug!(stage = %PipelineStage::Validated, source_bytes = request.source_text().len());

            debug!(stage = %PipelineStage::Analyzing);
            let report = self.static_analysis(request.source_text()).await?;

            debug!(stage = %PipelineStage::Composing);
            let prompt = self.template.compose(request.source_text(), report.as_str());

            debug!(stage = %PipelineStage::Summarizing, provider = %self.summarizer.provider_name());
            let summary = match self.summarizer.summarize(&prompt).await {
                Ok(text) => SummaryResult::success(text),
                Err(e) => SummaryResult::failure(e.to_string()),
            };
            self.metrics.record_summary(summary.succeeded);

            let elapsed = start.elapsed();
            self.metrics.analysis_duration.observe(elapsed.as_secs_f64());
            info!(
                stage = %PipelineStage::Completed,
                summary_ok = summary.succeeded,
                elapsed_ms = elapsed.as_millis() as u64,
                "Analysis finished"
            );

            Ok(AnalysisResponse::assemble(report, summary))
        }
        .instrument(span)
        .await
    }

    /// Scoped around the tool call only: the scratch file is gone before summarization starts.
    async fn static_analysis(&self, source_text: &str) -> Result<StaticReport> {
        let scratch = self.scratch.acquire(source_text)?;

        let (outcome, report) = self.runner.run(&scratch).await;
        self.metrics.record_outcome(&outcome);

        // A failed delete is already logged by `release` and must not replace the report.
        if scratch.release().is_err() {
            self.metrics.scratch_cleanup_failures.inc();
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use solaudit_ai::{BaselineProvider, GenerationConfig, LLMResponse, LLMResult, Message};
    use solaudit_core::AuditError;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LLMProvider for CountingProvider {
        async fn generate_chat(
            &self,
            _messages: &[Message],
            _config: &GenerationConfig,
        ) -> LLMResult<LLMResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            BaselineProvider::with_text("counted").generate("").await
        }

        fn provider_name(&self) -> &str {
            "counting"
        }

        fn model_name(&self) -> &str {
            "counting-model"
        }
    }

    fn pipeline(
        scratch_dir: &Path,
        command: &str,
        provider: Arc<dyn LLMProvider>,
    ) -> AnalysisPipeline {
        AnalysisPipeline::new(
            ScratchFileManager::new(scratch_dir, ".sol"),
            StaticAnalysisRunner::new(command, vec![], Duration::from_secs(5)),
            PromptTemplate::parse(solaudit_ai::prompts::DEFAULT_TEMPLATE).unwrap(),
            AuditSummarizer::new(provider, GenerationConfig::default(), Duration::from_secs(5)),
            Arc::new(PipelineMetrics::new().unwrap()),
        )
    }

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_rejected_request_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let scratch_dir = dir.path().join("scratch");
        let provider = Arc::new(CountingProvider::default());
        let pipeline = pipeline(&scratch_dir, "/nonexistent/tool", provider.clone());

        let err = pipeline.analyze(br#"{"sourceText": ""}"#).await.unwrap_err();
        assert!(matches!(err, AuditError::InvalidInput(_)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert!(!scratch_dir.exists());
        assert_eq!(pipeline.metrics.analyze_rejected.get(), 1);
    }

    #[tokio::test]
    async fn test_missing_tool_still_produces_full_response() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(CountingProvider::default());
        let pipeline = pipeline(dir.path(), "/nonexistent/tool", provider.clone());

        let response = pipeline
            .analyze(br#"{"sourceText": "contract C {}"}"#)
            .await
            .unwrap();

        assert!(response.static_report.starts_with("Slither failed: could not start"));
        assert_eq!(response.narrative_summary, "counted");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_scratch_setup_failure_aborts_before_summary() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file-not-dir");
        std::fs::write(&blocker, "x").unwrap();
        let provider = Arc::new(CountingProvider::default());
        let pipeline = pipeline(&blocker, "/nonexistent/tool", provider.clone());

        let err = pipeline
            .analyze(br#"{"sourceText": "contract C {}"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::ScratchSetup(_)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_cleanup_keeps_report() {
        use std::os::unix::fs::PermissionsExt;

        let tools = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        // The tool removes its own target, so the later delete fails.
        let tool = tools.path().join("self-cleaning.sh");
        std::fs::write(&tool, "#!/bin/sh\nrm \"$1\"; echo report\n").unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let provider = Arc::new(CountingProvider::default());
        let pipeline = pipeline(scratch.path(), &tool.to_string_lossy(), provider.clone());

        let response = pipeline
            .analyze(br#"{"sourceText": "contract C {}"}"#)
            .await
            .unwrap();

        assert_eq!(response.static_report, "report");
        assert_eq!(response.narrative_summary, "counted");
        assert_eq!(pipeline.metrics.scratch_cleanup_failures.get(), 1);
        assert_eq!(entries(scratch.path()), 0);
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(PipelineStage::Summarizing.to_string(), "summarizing");
        assert_eq!(PipelineStage::Rejected.to_string(), "rejected");
    }
}
