//! Response DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use pitchforge_entity::{LockEntry, PipelineRun, QueueStatistics, RunStatus, Step, StepName};

/// Accepted ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIngestionResponse {
    /// Run identifier, used for status polling.
    pub id: Uuid,
    /// Queued job driving the run.
    pub job_id: Uuid,
    /// Blob holding the script.
    pub blob_key: String,
    /// Run status.
    pub status: RunStatus,
    /// Run progress.
    pub progress: u8,
}

/// Run summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionResponse {
    /// Run identifier.
    pub id: Uuid,
    /// Owning project.
    pub project_id: Option<String>,
    /// Run status.
    pub status: RunStatus,
    /// Overall progress, 0 to 100.
    pub progress: u8,
    /// Step failures so far.
    pub step_failures: u32,
    /// Why the last drive stopped or the run failed.
    pub error: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last change.
    pub updated_at: DateTime<Utc>,
    /// Terminal transition time.
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<&PipelineRun> for IngestionResponse {
    fn from(run: &PipelineRun) -> Self {
        Self {
            id: run.id,
            project_id: run.project_id.clone(),
            status: run.status,
            progress: run.progress,
            step_failures: run.step_failures,
            error: run.error.clone(),
            created_at: run.created_at,
            updated_at: run.updated_at,
            finished_at: run.finished_at,
        }
    }
}

/// Ordered steps of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepsResponse {
    /// Run identifier.
    pub run_id: Uuid,
    /// Run status.
    pub status: RunStatus,
    /// Overall progress.
    pub progress: u8,
    /// Steps in execution order.
    pub steps: Vec<Step>,
}

/// Final package of a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageResponse {
    /// Run identifier.
    pub id: Uuid,
    /// Generated document, when one exists.
    pub document_url: Option<String>,
    /// Generated pitch deck, when one exists.
    pub deck_url: Option<String>,
    /// Package summary.
    pub summary: Value,
    /// Outputs of every generated step, keyed by step name.
    pub outputs: Map<String, Value>,
}

impl PackageResponse {
    /// Assemble from a run id and its outputs.
    pub fn new(id: Uuid, outputs: Map<String, Value>) -> Self {
        let final_package = outputs.get(StepName::FinalPackage.as_str());
        let field = |name: &str| {
            final_package
                .and_then(|p| p.get(name))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        Self {
            id,
            document_url: field("document_url"),
            deck_url: field("deck_url"),
            summary: final_package
                .and_then(|p| p.get("summary"))
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new())),
            outputs,
        }
    }
}

/// Process-level diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessDiagnostics {
    /// Operating system process id.
    pub pid: u32,
    /// When the process started serving.
    pub started_at: DateTime<Utc>,
    /// Seconds since start.
    pub uptime_seconds: i64,
    /// Resident memory, where the platform reports it.
    pub memory_rss_bytes: Option<u64>,
}

/// `GET /api/queue/status`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatusResponse {
    /// Queue counts.
    pub stats: QueueStatistics,
    /// Process diagnostics.
    pub process: ProcessDiagnostics,
}

/// Result of a lock action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStatusResponse {
    /// Lock name.
    pub lock: String,
    /// Whether the lock is held after the action.
    pub locked: bool,
    /// Current holder.
    pub entry: Option<LockEntry>,
    /// Holder removed by a forced unlock.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub released: Option<LockEntry>,
}

/// Outcome of a dead-letter mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterActionResponse {
    /// Affected job.
    pub job_id: Uuid,
    /// What happened.
    pub message: String,
}
