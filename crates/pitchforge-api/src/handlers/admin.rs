//! Dead-letter administration handlers.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde_json::{Value, json};
use uuid::Uuid;

use pitchforge_core::error::AppError;
use pitchforge_core::types::PageResponse;
use pitchforge_entity::DeadLetterJob;

use crate::dto::request::AdminAction;
use crate::dto::response::DeadLetterActionResponse;
use crate::error::ApiResult;
use crate::extractors::{AdminAuth, DeadLetterQuery};
use crate::state::AppState;

/// GET /api/admin/dead-letter
pub async fn list_dead_letter(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Query(query): Query<DeadLetterQuery>,
) -> ApiResult<Json<PageResponse<DeadLetterJob>>> {
    let page = query.page_request();
    let (items, total) = state
        .queue
        .get_dead_letter_jobs(&page, &query.filter())
        .await?;
    Ok(Json(PageResponse::new(items, page, total)))
}

/// DELETE /api/admin/dead-letter/{id}
pub async fn delete_dead_letter(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeadLetterActionResponse>> {
    if !state.queue.delete_dead_letter(id).await? {
        return Err(AppError::not_found(format!("Dead-letter job {id} not found")).into());
    }
    Ok(Json(DeadLetterActionResponse {
        job_id: id,
        message: "Dead-letter job deleted".to_string(),
    }))
}

/// POST /api/admin/dead-letter/{id}/retry
pub async fn retry_dead_letter(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeadLetterActionResponse>> {
    if state.queue.requeue_dead_letter(id).await?.is_none() {
        return Err(AppError::not_found(format!("Dead-letter job {id} not found")).into());
    }
    Ok(Json(DeadLetterActionResponse {
        job_id: id,
        message: "Job requeued".to_string(),
    }))
}

/// POST /api/admin/actions
pub async fn admin_action(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Json(action): Json<AdminAction>,
) -> ApiResult<Json<Value>> {
    match action {
        AdminAction::CleanupOldJobs { older_than_days } => {
            let days = older_than_days.unwrap_or(state.config.queue.cleanup_older_than_days);
            let summary = state.processor.run_cleanup(days).await?;
            tracing::info!(
                older_than_days = days,
                skipped = summary.skipped,
                cleaned_jobs = summary.report.cleaned_jobs,
                "Cleanup requested by admin"
            );
            Ok(Json(json!({ "action": "cleanup_old_jobs", "olderThanDays": days, "result": summary })))
        }
        AdminAction::GetMetrics => {
            let report = state.health().await;
            Ok(Json(json!({ "action": "get_metrics", "result": report })))
        }
    }
}
