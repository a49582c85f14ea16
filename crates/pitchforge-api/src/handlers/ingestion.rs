//! Ingestion submission and pipeline status handlers.

use std::time::Duration;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use uuid::Uuid;

use pitchforge_core::error::AppError;
use pitchforge_entity::{IngestionRequest, PipelineRun};

use crate::dto::request::CreateIngestionRequest;
use crate::dto::response::{
    CreateIngestionResponse, IngestionResponse, PackageResponse, StepsResponse,
};
use crate::error::ApiResult;
use crate::state::AppState;

/// POST /api/ingestions
///
/// Stores inline content if given, creates the run in `queued` state and
/// enqueues the job that will drive it.
pub async fn create_ingestion(
    State(state): State<AppState>,
    Json(req): Json<CreateIngestionRequest>,
) -> ApiResult<(StatusCode, Json<CreateIngestionResponse>)> {
    let run_id = Uuid::new_v4();
    let blob_key = store_source(&state, run_id, &req).await?;

    let run = state.runs.create(run_id, req.project_id.clone()).await?;
    let request = IngestionRequest {
        run_id,
        project_id: req.project_id,
        blob_key: blob_key.clone(),
        mime_type: req.mime_type,
        kind: req.kind,
        region: req.region,
        platforms: req.platforms,
    };
    let payload = serde_json::to_value(&request).map_err(AppError::from)?;
    let job_id = state
        .queue
        .enqueue(
            payload,
            req.priority.unwrap_or_default(),
            req.delay_seconds.map(Duration::from_secs),
        )
        .await?;

    tracing::info!(run_id = %run_id, job_id = %job_id, blob_key = %blob_key, "Ingestion accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(CreateIngestionResponse {
            id: run_id,
            job_id,
            blob_key,
            status: run.status,
            progress: run.progress,
        }),
    ))
}

/// GET /api/ingestions/{id}
pub async fn get_ingestion(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<IngestionResponse>> {
    let run = load_run(&state, id).await?;
    Ok(Json(IngestionResponse::from(&run)))
}

/// GET /api/ingestions/{id}/steps
pub async fn list_steps(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<StepsResponse>> {
    let run = load_run(&state, id).await?;
    Ok(Json(StepsResponse {
        run_id: run.id,
        status: run.status,
        progress: run.progress,
        steps: run.steps,
    }))
}

/// GET /api/ingestions/{id}/package
///
/// 409 while the run has not finished.
pub async fn get_package(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PackageResponse>> {
    match state.runs.package(id).await? {
        Some(outputs) => Ok(Json(PackageResponse::new(id, outputs))),
        None => {
            load_run(&state, id).await?;
            Err(AppError::conflict(format!("Ingestion {id} has not finished yet")).into())
        }
    }
}

async fn load_run(state: &AppState, id: Uuid) -> Result<PipelineRun, AppError> {
    state
        .runs
        .get(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Ingestion {id} not found")))
}

/// Store the source under `uploads/{run_id}/`.
///
/// An existing blob referenced by `blobKey` is copied, so each run owns the
/// blob its job payload points to and cleanup never removes another run's
/// upload.
async fn store_source(
    state: &AppState,
    run_id: Uuid,
    req: &CreateIngestionRequest,
) -> Result<String, AppError> {
    let (data, name) = match (&req.content, &req.blob_key) {
        (Some(content), _) => {
            let data = STANDARD
                .decode(content.trim())
                .map_err(|e| AppError::validation(format!("content is not valid base64: {e}")))?;
            (Bytes::from(data), req.file_name.as_deref())
        }
        (None, Some(key)) => {
            if !state.blobs.exists(key).await? {
                return Err(AppError::not_found(format!("Blob '{key}' not found")));
            }
            let data = state.blobs.read(key).await?;
            (data, req.file_name.as_deref().or(Some(key.as_str())))
        }
        (None, None) => {
            return Err(AppError::validation(
                "either content or blobKey is required",
            ));
        }
    };
    if data.is_empty() {
        return Err(AppError::validation("content is empty"));
    }

    let name = name
        .map(sanitize_file_name)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "script".to_string());
    let key = format!("uploads/{run_id}/{name}");
    state.blobs.write(&key, data).await?;
    Ok(key)
}

fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    base.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}
