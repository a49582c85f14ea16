//! Queue inspection and lock administration handlers.

use axum::Json;
use axum::extract::State;
use chrono::Utc;

use pitchforge_core::error::AppError;
use pitchforge_worker::lock::PROCESS_LOCK;

use crate::dto::request::QueueAction;
use crate::dto::response::{LockStatusResponse, ProcessDiagnostics, QueueStatusResponse};
use crate::error::ApiResult;
use crate::extractors::AdminAuth;
use crate::state::AppState;

/// GET /api/queue/status
pub async fn queue_status(
    State(state): State<AppState>,
    _auth: AdminAuth,
) -> ApiResult<Json<QueueStatusResponse>> {
    let stats = state.queue.get_queue_stats().await?;
    let started_at = state.metrics.started_at();

    Ok(Json(QueueStatusResponse {
        stats,
        process: ProcessDiagnostics {
            pid: std::process::id(),
            started_at,
            uptime_seconds: (Utc::now() - started_at).num_seconds(),
            memory_rss_bytes: resident_memory().await,
        },
    }))
}

/// POST /api/queue/actions
pub async fn queue_action(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Json(action): Json<QueueAction>,
) -> ApiResult<Json<LockStatusResponse>> {
    match action {
        QueueAction::ForceUnlock { lock } => {
            let name = lock_name(lock)?;
            let released = state.lock.inspect(&name).await?;
            state.lock.release(&name).await?;
            tracing::warn!(lock = %name, holder = ?released.as_ref().map(|e| &e.holder), "Lock force-released");
            Ok(Json(LockStatusResponse {
                lock: name,
                locked: false,
                entry: None,
                released,
            }))
        }
        QueueAction::CheckLock { lock } => {
            let name = lock_name(lock)?;
            let entry = state.lock.inspect(&name).await?;
            Ok(Json(LockStatusResponse {
                lock: name,
                locked: entry.is_some(),
                entry,
                released: None,
            }))
        }
    }
}

fn lock_name(lock: Option<String>) -> Result<String, AppError> {
    let name = lock.unwrap_or_else(|| PROCESS_LOCK.to_string());
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(AppError::validation(format!("Invalid lock name '{name}'")));
    }
    Ok(name)
}

/// Resident set size from `/proc/self/status`, where available.
async fn resident_memory() -> Option<u64> {
    let status = tokio::fs::read_to_string("/proc/self/status").await.ok()?;
    parse_vm_rss(&status)
}

fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kib: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kib * 1024)
}
