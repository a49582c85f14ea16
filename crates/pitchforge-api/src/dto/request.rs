//! Request DTOs.

use serde::{Deserialize, Serialize};

use pitchforge_entity::{ExtractionKind, JobPriority};

/// `POST /api/ingestions`
///
/// The script is either uploaded inline as base64 `content` or referenced by
/// the `blobKey` of an earlier upload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIngestionRequest {
    /// Owning project.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Key of an already stored upload.
    #[serde(default)]
    pub blob_key: Option<String>,
    /// Base64-encoded script bytes.
    #[serde(default)]
    pub content: Option<String>,
    /// Original file name of inline content.
    #[serde(default)]
    pub file_name: Option<String>,
    /// MIME type of the upload.
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Explicit extraction kind.
    #[serde(default)]
    pub kind: Option<ExtractionKind>,
    /// Target market region.
    #[serde(default)]
    pub region: Option<String>,
    /// Target platforms.
    #[serde(default)]
    pub platforms: Vec<String>,
    /// Queue priority (default: medium).
    #[serde(default)]
    pub priority: Option<JobPriority>,
    /// Delay before the job becomes eligible.
    #[serde(default)]
    pub delay_seconds: Option<u64>,
}

/// `POST /api/admin/actions`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AdminAction {
    /// Remove dead-letter jobs older than the given age.
    CleanupOldJobs {
        /// Age in days; the configured default when absent.
        #[serde(default, rename = "olderThanDays")]
        older_than_days: Option<u32>,
    },
    /// Return the processing metrics.
    GetMetrics,
}

/// `POST /api/queue/actions`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum QueueAction {
    /// Delete a lock regardless of its holder.
    ForceUnlock {
        /// Lock name (default: `process`).
        #[serde(default)]
        lock: Option<String>,
    },
    /// Report whether a lock is held and by whom.
    CheckLock {
        /// Lock name (default: `process`).
        #[serde(default)]
        lock: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_action_tags() {
        let action: AdminAction =
            serde_json::from_str(r#"{"action":"cleanup_old_jobs","olderThanDays":3}"#).unwrap();
        assert!(matches!(
            action,
            AdminAction::CleanupOldJobs {
                older_than_days: Some(3)
            }
        ));

        let action: AdminAction = serde_json::from_str(r#"{"action":"get_metrics"}"#).unwrap();
        assert!(matches!(action, AdminAction::GetMetrics));

        assert!(serde_json::from_str::<AdminAction>(r#"{"action":"drop_all"}"#).is_err());
    }

    #[test]
    fn test_queue_action_default_lock() {
        let action: QueueAction = serde_json::from_str(r#"{"action":"check_lock"}"#).unwrap();
        assert!(matches!(action, QueueAction::CheckLock { lock: None }));
    }
}
