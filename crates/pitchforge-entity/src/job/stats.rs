//! Queue statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Derived queue statistics.
///
/// `pending_jobs`, `dead_letter_jobs` and `oldest_job_created` are
/// recomputed from the store listing on every read; `completed_jobs` and
/// `failed_jobs` come from running counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatistics {
    /// Jobs waiting in the pending set (eligible or delayed).
    pub pending_jobs: u64,
    /// Jobs completed since the counters were created.
    pub completed_jobs: u64,
    /// Jobs moved to the dead-letter set since the counters were created.
    pub failed_jobs: u64,
    /// Jobs currently in the dead-letter set.
    pub dead_letter_jobs: u64,
    /// Creation time of the oldest pending job.
    pub oldest_job_created: Option<DateTime<Utc>>,
}

/// Partial update merged into the running counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsUpdate {
    /// Amount to add to `completed_jobs`.
    #[serde(default)]
    pub completed_jobs: Option<i64>,
    /// Amount to add to `failed_jobs`.
    #[serde(default)]
    pub failed_jobs: Option<i64>,
}
