//! Job queue configuration: retry policy, batching and lock TTLs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Job queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Attempts after which a job is moved to the dead-letter set.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base retry delay in milliseconds.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,
    /// Upper bound of the retry delay in milliseconds.
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_ms: u64,
    /// Maximum number of jobs dequeued per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Number of jobs of one batch processed concurrently (1 = sequential).
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
    /// Seconds after the start of a pass during which new jobs are claimed.
    /// Jobs already claimed still run to completion.
    #[serde(default = "default_claim_window")]
    pub claim_window_seconds: u64,
    /// TTL of the batch-processing lock in seconds. Must exceed the claim
    /// window plus the longest offload timeout.
    #[serde(default = "default_process_lock_ttl")]
    pub process_lock_ttl_seconds: u64,
    /// TTL of the cleanup lock in seconds.
    #[serde(default = "default_cleanup_lock_ttl")]
    pub cleanup_lock_ttl_seconds: u64,
    /// Age in days after which dead-letter jobs are swept by the scheduled cleanup.
    #[serde(default = "default_cleanup_days")]
    pub cleanup_older_than_days: u32,
}

impl QueueConfig {
    /// TTL of the batch-processing lock.
    pub fn process_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.process_lock_ttl_seconds)
    }

    /// Window of a pass during which new jobs are claimed.
    pub fn claim_window(&self) -> Duration {
        Duration::from_secs(self.claim_window_seconds)
    }

    /// TTL of the cleanup lock.
    pub fn cleanup_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.cleanup_lock_ttl_seconds)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base(),
            backoff_cap_ms: default_backoff_cap(),
            batch_size: default_batch_size(),
            batch_concurrency: default_batch_concurrency(),
            claim_window_seconds: default_claim_window(),
            process_lock_ttl_seconds: default_process_lock_ttl(),
            cleanup_lock_ttl_seconds: default_cleanup_lock_ttl(),
            cleanup_older_than_days: default_cleanup_days(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_base() -> u64 {
    400
}

fn default_backoff_cap() -> u64 {
    1500
}

fn default_batch_size() -> usize {
    10
}

fn default_batch_concurrency() -> usize {
    1
}

fn default_claim_window() -> u64 {
    90
}

fn default_process_lock_ttl() -> u64 {
    300
}

fn default_cleanup_lock_ttl() -> u64 {
    60
}

fn default_cleanup_days() -> u32 {
    7
}
