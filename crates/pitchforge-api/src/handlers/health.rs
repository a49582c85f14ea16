//! Health check handler.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use pitchforge_worker::metrics::{HealthReport, HealthStatus};

use crate::state::AppState;

/// GET /api/health
///
/// Answers 503 when the queue store is unreachable.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = state.health().await;
    let status = match report.status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
    };
    (status, Json(report))
}
