//! Key builders for every queue store entry.
//!
//! Pending jobs are keyed by priority so a listing can be narrowed without
//! deserializing. The store itself is ordering-agnostic.

use uuid::Uuid;

/// Prefix of all pending job entries.
pub const PENDING_PREFIX: &str = "pending:";

/// Prefix of all dead-letter entries.
pub const DEAD_LETTER_PREFIX: &str = "deadletter:";

/// Prefix of all pipeline run records.
pub const RUN_PREFIX: &str = "run:";

/// Counter of completed jobs.
pub const STATS_COMPLETED: &str = "stats:completed";

/// Counter of jobs moved to the dead-letter set.
pub const STATS_FAILED: &str = "stats:failed";

/// Key of a pending job.
pub fn pending(priority: &str, job_id: Uuid) -> String {
    format!("{PENDING_PREFIX}{priority}:{job_id}")
}

/// Key of a dead-letter entry.
pub fn dead_letter(job_id: Uuid) -> String {
    format!("{DEAD_LETTER_PREFIX}{job_id}")
}

/// Key of a named lock.
pub fn lock(name: &str) -> String {
    format!("lock:{name}")
}

/// Key of a pipeline run record.
pub fn run(run_id: Uuid) -> String {
    format!("{RUN_PREFIX}{run_id}")
}
