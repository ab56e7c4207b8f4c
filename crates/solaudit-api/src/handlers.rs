use crate::error::{ApiError, ApiResult};
use crate::insights::ReportInsights;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use solaudit_core::AnalysisResponse;
use tracing::error;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightsRequest {
    pub static_report: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `POST /analyze`. The body is parsed by the pipeline so that malformed JSON gets
/// the same answer as missing source text.
pub async fn analyze(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<AnalysisResponse>> {
    let pipeline = state.pipeline.clone();

    // Detached so a dropped connection cannot interrupt cleanup of the scratch file.
    let task = tokio::spawn(async move { pipeline.analyze(&body).await });

    match task.await {
        Ok(result) => Ok(Json(result?)),
        Err(e) => {
            error!("Analysis task failed: {}", e);
            Err(ApiError::Internal("analysis task failed".to_string()))
        }
    }
}

pub async fn insights(body: Bytes) -> ApiResult<Json<ReportInsights>> {
    let request: InsightsRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("expected {{\"staticReport\": string}}: {}", e)))?;
    Ok(Json(ReportInsights::from_report(&request.static_report)))
}

pub async fn metrics_handler(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let body = state.metrics.render().map_err(|e| {
        error!("could not encode metrics: {}", e);
        ApiError::Internal("could not encode metrics".to_string())
    })?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}
