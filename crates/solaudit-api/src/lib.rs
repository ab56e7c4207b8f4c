pub mod error;
pub mod handlers;
pub mod insights;
pub mod metrics;
pub mod pipeline;
pub mod routes;
pub mod server;
pub mod state;

pub use error::*;
pub use insights::{ReportInsights, RiskBand};
pub use metrics::PipelineMetrics;
pub use pipeline::{AnalysisPipeline, PipelineStage};
pub use routes::create_router;
pub use server::Server;
pub use state::AppState;
