//! Dead-letter archive entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::model::Job;

/// A job archived after exhausting its retries.
///
/// The failure metadata is immutable once written. Entries are never
/// retried automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterJob {
    /// The job as it was when it exhausted its attempts (original payload included).
    pub job: Job,
    /// When the job was archived.
    pub failed_at: DateTime<Utc>,
    /// The error of the final attempt.
    pub last_error: String,
    /// Number of attempts made.
    pub retry_count: u32,
}

impl DeadLetterJob {
    /// Archive a job with its final error.
    pub fn from_job(job: Job, error: impl Into<String>) -> Self {
        let last_error = error.into();
        let retry_count = job.attempt;
        Self {
            job: Job {
                last_error: Some(last_error.clone()),
                ..job
            },
            failed_at: Utc::now(),
            last_error,
            retry_count,
        }
    }

    /// Identifier of the archived job.
    pub fn id(&self) -> Uuid {
        self.job.id
    }

    /// The original payload.
    pub fn payload(&self) -> &serde_json::Value {
        &self.job.payload
    }
}
