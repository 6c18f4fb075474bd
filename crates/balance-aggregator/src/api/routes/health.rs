//! Health check route handler

use crate::{api::types::HealthCheckResponse, server::AppState};
use axum::{extract::State, Json};

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthCheckResponse),
    ),
    tag = "health",
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    let workers = state.aggregator.worker_names().len();

    Json(HealthCheckResponse {
        status: if workers > 0 { "healthy" } else { "degraded" }.to_string(),
        version: crate::VERSION.to_string(),
        timestamp: chrono::Utc::now(),
        workers,
    })
}
