//! Job processing metrics and the health report.
//!
//! Counters are atomics; the latency window and the per-error-kind tally sit
//! behind mutexes. The health report combines them with live queue, lock,
//! offload and store state.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use pitchforge_core::error::AppError;
use pitchforge_core::traits::store::QueueStore;
use pitchforge_entity::{LockEntry, QueueStatistics};

use crate::lock::{CLEANUP_LOCK, DistributedLock, PROCESS_LOCK};
use crate::offload::{CapabilityState, OffloadManager, OffloadStats};
use crate::processor::BatchSummary;
use crate::queue::JobQueue;

/// Maximum number of job duration samples kept in memory.
const MAX_DURATION_SAMPLES: usize = 1000;

/// Overall health verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Everything works.
    Healthy,
    /// Work proceeds with reduced capability.
    Degraded,
    /// The queue store is unreachable.
    Unhealthy,
}

/// Collector of job processing metrics.
#[derive(Debug)]
pub struct MetricsReporter {
    started_at: DateTime<Utc>,
    batches: AtomicU64,
    skipped_batches: AtomicU64,
    jobs_succeeded: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_retried: AtomicU64,
    jobs_dead_lettered: AtomicU64,
    error_kinds: Mutex<BTreeMap<String, u64>>,
    duration_samples: Mutex<Vec<Duration>>,
    last_batch: Mutex<Option<BatchSummary>>,
}

/// Point-in-time copy of the collected metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Batches that ran.
    pub batches: u64,
    /// Batches skipped because another processor held the lock.
    pub skipped_batches: u64,
    /// Jobs that completed.
    pub jobs_succeeded: u64,
    /// Failed job attempts.
    pub jobs_failed: u64,
    /// Failed attempts that were scheduled for retry.
    pub jobs_retried: u64,
    /// Jobs moved to the dead-letter set.
    pub jobs_dead_lettered: u64,
    /// Failed attempts by error code.
    pub errors_by_kind: BTreeMap<String, u64>,
    /// Median job duration in milliseconds.
    pub duration_p50_ms: Option<u64>,
    /// 95th percentile job duration in milliseconds.
    pub duration_p95_ms: Option<u64>,
    /// 99th percentile job duration in milliseconds.
    pub duration_p99_ms: Option<u64>,
    /// Number of duration samples.
    pub sample_count: u64,
    /// Summary of the most recent batch.
    pub last_batch: Option<BatchSummary>,
}

/// Held locks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockReport {
    /// Holder of the batch processing lock.
    pub process: Option<LockEntry>,
    /// Holder of the cleanup lock.
    pub cleanup: Option<LockEntry>,
}

/// Combined health of the job subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// Overall verdict.
    pub status: HealthStatus,
    /// Whether the queue store answered its health check.
    pub store_healthy: bool,
    /// Name of the queue store provider.
    pub store_provider: String,
    /// Queue counts, absent when the store could not be read.
    pub queue: Option<QueueStatistics>,
    /// Offload telemetry.
    pub offload: OffloadStats,
    /// Held locks, absent when the store could not be read.
    pub locks: Option<LockReport>,
    /// Processing metrics.
    pub metrics: MetricsSnapshot,
    /// Seconds since the reporter was created.
    pub uptime_seconds: i64,
    /// When the report was produced.
    pub generated_at: DateTime<Utc>,
}

impl MetricsReporter {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            batches: AtomicU64::new(0),
            skipped_batches: AtomicU64::new(0),
            jobs_succeeded: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            jobs_retried: AtomicU64::new(0),
            jobs_dead_lettered: AtomicU64::new(0),
            error_kinds: Mutex::new(BTreeMap::new()),
            duration_samples: Mutex::new(Vec::with_capacity(MAX_DURATION_SAMPLES)),
            last_batch: Mutex::new(None),
        }
    }

    /// When the collector was created.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Record a completed job.
    pub fn record_success(&self, duration: Duration) {
        self.jobs_succeeded.fetch_add(1, Ordering::Relaxed);
        self.add_duration_sample(duration);
    }

    /// Record a failed job attempt.
    pub fn record_failure(&self, error: &AppError, duration: Duration) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        self.add_duration_sample(duration);
        if let Ok(mut kinds) = self.error_kinds.lock() {
            *kinds.entry(error.kind.code().to_string()).or_insert(0) += 1;
        }
    }

    /// Record a failed attempt that was scheduled for retry.
    pub fn record_retry(&self) {
        self.jobs_retried.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a job moved to the dead-letter set.
    pub fn record_dead_letter(&self) {
        self.jobs_dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished batch.
    pub fn record_batch(&self, summary: &BatchSummary) {
        if summary.skipped {
            self.skipped_batches.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.batches.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_batch.lock() {
            *last = Some(summary.clone());
        }
    }

    fn add_duration_sample(&self, duration: Duration) {
        if let Ok(mut samples) = self.duration_samples.lock() {
            if samples.len() >= MAX_DURATION_SAMPLES {
                samples.remove(0);
            }
            samples.push(duration);
        }
    }

    /// Current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let durations = self
            .duration_samples
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default();
        let (p50, p95, p99) = percentiles(&durations);

        MetricsSnapshot {
            batches: self.batches.load(Ordering::Relaxed),
            skipped_batches: self.skipped_batches.load(Ordering::Relaxed),
            jobs_succeeded: self.jobs_succeeded.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            jobs_retried: self.jobs_retried.load(Ordering::Relaxed),
            jobs_dead_lettered: self.jobs_dead_lettered.load(Ordering::Relaxed),
            errors_by_kind: self
                .error_kinds
                .lock()
                .map(|k| k.clone())
                .unwrap_or_default(),
            duration_p50_ms: p50.map(as_millis),
            duration_p95_ms: p95.map(as_millis),
            duration_p99_ms: p99.map(as_millis),
            sample_count: durations.len() as u64,
            last_batch: self.last_batch.lock().ok().and_then(|l| l.clone()),
        }
    }

    /// Build a health report from live subsystem state.
    ///
    /// Store failures lower the verdict instead of failing the report.
    pub async fn report(
        &self,
        store: &dyn QueueStore,
        store_provider: &str,
        queue: &JobQueue,
        lock: &DistributedLock,
        offload: &OffloadManager,
    ) -> HealthReport {
        let store_healthy = match store.health_check().await {
            Ok(healthy) => healthy,
            Err(e) => {
                warn!(error = %e, "Queue store health check failed");
                false
            }
        };

        let queue_stats = match queue.get_queue_stats().await {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!(error = %e, "Failed to read queue statistics");
                None
            }
        };

        let locks = match (lock.inspect(PROCESS_LOCK).await, lock.inspect(CLEANUP_LOCK).await) {
            (Ok(process), Ok(cleanup)) => Some(LockReport { process, cleanup }),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Failed to read locks");
                None
            }
        };

        let offload = offload.stats();
        let status = if !store_healthy || queue_stats.is_none() {
            HealthStatus::Unhealthy
        } else if offload.fallbacks > 0
            || (offload.state == CapabilityState::Unsupported && offload.runtime != "restricted")
            || queue_stats.as_ref().is_some_and(|q| q.dead_letter_jobs > 0)
        {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        let now = Utc::now();
        HealthReport {
            status,
            store_healthy,
            store_provider: store_provider.to_string(),
            queue: queue_stats,
            offload,
            locks,
            metrics: self.snapshot(),
            uptime_seconds: (now - self.started_at).num_seconds(),
            generated_at: now,
        }
    }
}

impl Default for MetricsReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn percentiles(durations: &[Duration]) -> (Option<Duration>, Option<Duration>, Option<Duration>) {
    if durations.is_empty() {
        return (None, None, None);
    }

    let mut sorted = durations.to_vec();
    sorted.sort();
    let len = sorted.len();

    let p50 = sorted.get(len * 50 / 100).copied();
    let p95 = sorted.get(len * 95 / 100).copied();
    let p99 = sorted.get(len.saturating_sub(1) * 99 / 100).copied();

    (p50, p95, p99)
}

fn as_millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}
