//! Job entity model.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::priority::JobPriority;

/// Job type used for script ingestion runs.
pub const INGESTION_JOB_TYPE: &str = "ingestion";

/// A unit of queued work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier, generated at enqueue time.
    pub id: Uuid,
    /// Job type identifier (e.g., `"ingestion"`).
    pub job_type: String,
    /// Opaque reference to the work to perform.
    pub payload: serde_json::Value,
    /// Job priority.
    pub priority: JobPriority,
    /// Enqueue time.
    pub created_at: DateTime<Utc>,
    /// Earliest time the job may be dequeued.
    pub not_before_at: DateTime<Utc>,
    /// Number of dequeue attempts so far.
    pub attempt: u32,
    /// Last failure description, present after at least one failed attempt.
    pub last_error: Option<String>,
}

impl Job {
    /// Create a new job that is eligible immediately.
    pub fn new(job_type: impl Into<String>, payload: serde_json::Value, priority: JobPriority) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            job_type: job_type.into(),
            payload,
            priority,
            created_at: now,
            not_before_at: now,
            attempt: 0,
            last_error: None,
        }
    }

    /// Override the enqueue time.
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        if self.not_before_at < at {
            self.not_before_at = at;
        }
        self
    }

    /// Delay eligibility until `at`.
    pub fn not_before(mut self, at: DateTime<Utc>) -> Self {
        self.not_before_at = at;
        self
    }

    /// Whether the job may be dequeued at `now`.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.not_before_at <= now
    }

    /// Dequeue order: higher priority first, then oldest first.
    ///
    /// Ties on both fall back to the time-ordered id so the order is total.
    pub fn dequeue_order(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| self.created_at.cmp(&other.created_at))
            .then_with(|| self.id.cmp(&other.id))
    }
}
