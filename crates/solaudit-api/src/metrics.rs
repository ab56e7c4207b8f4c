use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use solaudit_analyzer::ProcessOutcome;

/// Counters for the analysis pipeline, held in a registry owned by the app state.
pub struct PipelineMetrics {
    registry: Registry,
    pub analyze_requests: IntCounter,
    pub analyze_rejected: IntCounter,
    pub analyzer_outcomes: IntCounterVec,
    pub summaries: IntCounterVec,
    pub scratch_cleanup_failures: IntCounter,
    pub analysis_duration: Histogram,
}

impl PipelineMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let analyze_requests = IntCounter::with_opts(Opts::new(
            "analyze_requests_total",
            "Total number of analyze requests received",
        ))?;
        let analyze_rejected = IntCounter::with_opts(Opts::new(
            "analyze_rejected_total",
            "Analyze requests rejected for missing source text",
        ))?;
        let analyzer_outcomes = IntCounterVec::new(
            Opts::new(
                "analyzer_outcomes_total",
                "Static-analysis tool invocations by outcome",
            ),
            &["outcome"],
        )?;
        let summaries = IntCounterVec::new(
            Opts::new("summaries_total", "Narrative summary calls by result"),
            &["result"],
        )?;
        let scratch_cleanup_failures = IntCounter::with_opts(Opts::new(
            "scratch_cleanup_failures_total",
            "Scratch files that could not be removed",
        ))?;
        let analysis_duration = Histogram::with_opts(
            HistogramOpts::new(
                "analysis_duration_seconds",
                "End-to-end duration of accepted analyze requests",
            )
            .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 40.0, 80.0]),
        )?;

        registry.register(Box::new(analyze_requests.clone()))?;
        registry.register(Box::new(analyze_rejected.clone()))?;
        registry.register(Box::new(analyzer_outcomes.clone()))?;
        registry.register(Box::new(summaries.clone()))?;
        registry.register(Box::new(scratch_cleanup_failures.clone()))?;
        registry.register(Box::new(analysis_duration.clone()))?;

        Ok(Self {
            registry,
            analyze_requests,
            analyze_rejected,
            analyzer_outcomes,
            summaries,
            scratch_cleanup_failures,
            analysis_duration,
        })
    }

    pub fn record_outcome(&self, outcome: &ProcessOutcome) {
        let label = match outcome {
            ProcessOutcome::Completed { .. } => "completed",
            ProcessOutcome::TimedOut { .. } => "timed_out",
            ProcessOutcome::SpawnFailed { .. } => "spawn_failed",
        };
        self.analyzer_outcomes.with_label_values(&[label]).inc();
    }

    pub fn record_summary(&self, succeeded: bool) {
        let label = if succeeded { "ok" } else { "failed" };
        self.summaries.with_label_values(&[label]).inc();
    }

    /// Prometheus text exposition of every registered metric
    pub fn render(&self) -> prometheus::Result<String> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}
