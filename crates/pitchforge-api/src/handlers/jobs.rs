//! Batch processing trigger.

use axum::Json;
use axum::extract::State;

use pitchforge_worker::BatchSummary;

use crate::error::ApiResult;
use crate::extractors::SchedulerAuth;
use crate::state::AppState;

/// POST /api/jobs/process
///
/// Runs one batch pass. A pass already running elsewhere yields a summary
/// with `skipped: true`.
pub async fn process_jobs(
    State(state): State<AppState>,
    _auth: SchedulerAuth,
) -> ApiResult<Json<BatchSummary>> {
    let summary = state.processor.process_batch().await?;
    Ok(Json(summary))
}
