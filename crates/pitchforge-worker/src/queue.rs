//! Durable job queue on top of the queue store.
//!
//! Pending jobs live under `pending:{priority}:{id}`, archived jobs under
//! `deadletter:{id}`. Dequeue claims a job with the store's atomic `take`,
//! so concurrent callers never receive the same job.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pitchforge_core::config::queue::QueueConfig;
use pitchforge_core::error::AppError;
use pitchforge_core::result::AppResult;
use pitchforge_core::traits::blob::BlobStore;
use pitchforge_core::traits::store::{QueueStore, get_json, set_json};
use pitchforge_core::types::PageRequest;
use pitchforge_entity::job::model::INGESTION_JOB_TYPE;
use pitchforge_entity::{DeadLetterJob, Job, JobPriority, QueueStatistics, StatsUpdate};
use pitchforge_store::keys;

/// Attempt duration from which the retry delay is scaled by the attempt number.
const LONG_RUNNING_THRESHOLD: Duration = Duration::from_secs(10);

/// Retry limits and backoff curve shared by every job type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after which a job is dead-lettered.
    pub max_attempts: u32,
    /// Delay before the first retry, doubled on each further attempt.
    pub base: Duration,
    /// Upper bound of the exponential part of the delay.
    pub cap: Duration,
    /// Attempts running at least this long get their delay scaled by the attempt number.
    pub long_running: Duration,
}

impl RetryPolicy {
    /// Build the policy from queue configuration.
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base: Duration::from_millis(config.backoff_base_ms),
            cap: Duration::from_millis(config.backoff_cap_ms),
            long_running: LONG_RUNNING_THRESHOLD,
        }
    }

    /// Delay before the job becomes eligible again after failing `attempt`.
    pub fn backoff(&self, attempt: u32, elapsed: Duration) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        let delay = self.base.saturating_mul(factor).min(self.cap);
        if elapsed >= self.long_running {
            delay.saturating_mul(attempt.max(1))
        } else {
            delay
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}

/// Optional filters for dead-letter listings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeadLetterFilter {
    /// Case-insensitive substring of the final error.
    pub error_contains: Option<String>,
    /// Only jobs archived at or after this time.
    pub failed_after: Option<DateTime<Utc>>,
    /// Only jobs archived at or before this time.
    pub failed_before: Option<DateTime<Utc>>,
}

impl DeadLetterFilter {
    /// Whether `job` passes every configured filter.
    pub fn matches(&self, job: &DeadLetterJob) -> bool {
        if let Some(needle) = &self.error_contains {
            if !job
                .last_error
                .to_lowercase()
                .contains(&needle.to_lowercase())
            {
                return false;
            }
        }
        if self.failed_after.is_some_and(|after| job.failed_at < after) {
            return false;
        }
        if self.failed_before.is_some_and(|before| job.failed_at > before) {
            return false;
        }
        true
    }
}

/// Outcome of an age-based dead-letter sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    /// Dead-letter entries removed.
    pub cleaned_jobs: u64,
    /// Blobs removed along with them.
    pub cleaned_blobs: u64,
    /// Pipeline run records removed along with them.
    pub cleaned_runs: u64,
    /// Per-item failures; the sweep continues past them.
    pub errors: Vec<String>,
}

/// Job queue for enqueuing, claiming, retrying and archiving work.
#[derive(Debug, Clone)]
pub struct JobQueue {
    store: Arc<dyn QueueStore>,
    blobs: Arc<dyn BlobStore>,
    policy: RetryPolicy,
}

impl JobQueue {
    /// Create a job queue over a store.
    pub fn new(store: Arc<dyn QueueStore>, blobs: Arc<dyn BlobStore>, policy: RetryPolicy) -> Self {
        Self {
            store,
            blobs,
            policy,
        }
    }

    /// The retry policy in effect.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Enqueue an ingestion payload, optionally delayed.
    pub async fn enqueue(
        &self,
        payload: serde_json::Value,
        priority: JobPriority,
        delay: Option<Duration>,
    ) -> AppResult<Uuid> {
        let mut job = Job::new(INGESTION_JOB_TYPE, payload, priority);
        if let Some(delay) = delay {
            let at = job.created_at + chrono_duration(delay);
            job = job.not_before(at);
        }
        self.enqueue_job(job).await
    }

    /// Store a fully built job in the pending set.
    pub async fn enqueue_job(&self, job: Job) -> AppResult<Uuid> {
        let key = keys::pending(job.priority.as_str(), job.id);
        set_json(self.store.as_ref(), &key, &job, None).await?;

        tracing::debug!(
            job_id = %job.id,
            job_type = %job.job_type,
            priority = %job.priority,
            not_before = %job.not_before_at,
            "Enqueued job"
        );
        Ok(job.id)
    }

    /// Claim the highest-priority, oldest eligible job.
    ///
    /// Returns `None` when no job is eligible. If another caller claims a
    /// candidate first, the next candidate in order is tried.
    pub async fn dequeue(&self) -> AppResult<Option<Job>> {
        let now = Utc::now();
        let mut candidates: Vec<(String, Job)> = self
            .pending_entries()
            .await?
            .into_iter()
            .filter(|(_, job)| job.is_eligible(now))
            .collect();
        candidates.sort_by(|(_, a), (_, b)| a.dequeue_order(b));

        for (key, _) in candidates {
            let Some(raw) = self.store.take(&key).await? else {
                continue;
            };
            let job: Job = serde_json::from_str(&raw).map_err(|e| {
                AppError::storage(format!("Corrupt pending job at '{key}': {e}"))
            })?;
            tracing::debug!(job_id = %job.id, attempt = job.attempt, "Dequeued job");
            return Ok(Some(job));
        }

        Ok(None)
    }

    /// Record a failed attempt.
    ///
    /// Returns `true` if the job was re-enqueued with a backoff delay and
    /// `false` if it exhausted its attempts and was dead-lettered.
    pub async fn schedule_retry(
        &self,
        mut job: Job,
        error: &str,
        elapsed: Duration,
    ) -> AppResult<bool> {
        job.attempt += 1;
        job.last_error = Some(error.to_string());

        if job.attempt >= self.policy.max_attempts {
            tracing::warn!(
                job_id = %job.id,
                attempt = job.attempt,
                elapsed_ms = elapsed.as_millis() as u64,
                error,
                "Job exhausted its attempts"
            );
            self.dead_letter(job, error).await?;
            return Ok(false);
        }

        let delay = self.policy.backoff(job.attempt, elapsed);
        job.not_before_at = Utc::now() + chrono_duration(delay);

        tracing::info!(
            job_id = %job.id,
            attempt = job.attempt,
            elapsed_ms = elapsed.as_millis() as u64,
            delay_ms = delay.as_millis() as u64,
            error,
            "Scheduled job retry"
        );
        self.enqueue_job(job).await?;
        Ok(true)
    }

    /// Archive a job in the dead-letter set and count it as failed.
    pub async fn dead_letter(&self, job: Job, error: &str) -> AppResult<DeadLetterJob> {
        let pending_key = keys::pending(job.priority.as_str(), job.id);
        let entry = DeadLetterJob::from_job(job, error);

        set_json(
            self.store.as_ref(),
            &keys::dead_letter(entry.id()),
            &entry,
            None,
        )
        .await?;
        self.store.delete(&pending_key).await?;
        self.update_stats(StatsUpdate {
            failed_jobs: Some(1),
            ..Default::default()
        })
        .await?;

        tracing::warn!(
            job_id = %entry.id(),
            retry_count = entry.retry_count,
            "Moved job to dead-letter set"
        );
        Ok(entry)
    }

    /// Mark a claimed job as completed.
    pub async fn complete(&self, job: &Job, elapsed: Duration) -> AppResult<()> {
        self.update_stats(StatsUpdate {
            completed_jobs: Some(1),
            ..Default::default()
        })
        .await?;
        tracing::debug!(
            job_id = %job.id,
            elapsed_ms = elapsed.as_millis() as u64,
            "Job completed"
        );
        Ok(())
    }

    /// List dead-letter jobs, newest failure first.
    pub async fn get_dead_letter_jobs(
        &self,
        page: &PageRequest,
        filter: &DeadLetterFilter,
    ) -> AppResult<(Vec<DeadLetterJob>, u64)> {
        let mut jobs: Vec<DeadLetterJob> = self
            .dead_letter_entries()
            .await?
            .into_iter()
            .filter(|job| filter.matches(job))
            .collect();
        jobs.sort_by(|a, b| b.failed_at.cmp(&a.failed_at).then_with(|| b.id().cmp(&a.id())));

        let total = jobs.len() as u64;
        let items = jobs
            .into_iter()
            .skip(page.offset())
            .take(page.limit())
            .collect();
        Ok((items, total))
    }

    /// Fetch a single dead-letter job.
    pub async fn get_dead_letter(&self, job_id: Uuid) -> AppResult<Option<DeadLetterJob>> {
        get_json(self.store.as_ref(), &keys::dead_letter(job_id)).await
    }

    /// Remove a dead-letter job. Returns whether it existed.
    pub async fn delete_dead_letter(&self, job_id: Uuid) -> AppResult<bool> {
        let removed = self.store.take(&keys::dead_letter(job_id)).await?;
        if removed.is_some() {
            tracing::info!(job_id = %job_id, "Deleted dead-letter job");
        }
        Ok(removed.is_some())
    }

    /// Move a dead-letter job back to the pending set with a fresh attempt count.
    pub async fn requeue_dead_letter(&self, job_id: Uuid) -> AppResult<Option<Job>> {
        let Some(raw) = self.store.take(&keys::dead_letter(job_id)).await? else {
            return Ok(None);
        };
        let entry: DeadLetterJob = serde_json::from_str(&raw)?;

        let now = Utc::now();
        let job = Job {
            attempt: 0,
            not_before_at: now,
            ..entry.job
        };
        self.enqueue_job(job.clone()).await?;

        tracing::info!(job_id = %job_id, "Requeued dead-letter job");
        Ok(Some(job))
    }

    /// Remove dead-letter jobs archived more than `older_than_days` ago,
    /// together with the blobs and run records their payloads reference.
    ///
    /// An entry whose blob cannot be deleted is kept, so a later sweep
    /// retries it.
    pub async fn cleanup_old_jobs(&self, older_than_days: u32) -> AppResult<CleanupReport> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(older_than_days));
        let mut report = CleanupReport::default();

        for (key, raw) in self.store.scan_prefix(keys::DEAD_LETTER_PREFIX).await? {
            let entry: DeadLetterJob = match serde_json::from_str(&raw) {
                Ok(entry) => entry,
                Err(e) => {
                    report.errors.push(format!("{key}: unreadable entry: {e}"));
                    continue;
                }
            };
            if entry.failed_at >= cutoff {
                continue;
            }

            if let Some(blob_key) = blob_key_of(entry.payload()) {
                match self.blobs.delete(blob_key).await {
                    Ok(()) => report.cleaned_blobs += 1,
                    Err(e) => {
                        report
                            .errors
                            .push(format!("{}: blob '{blob_key}': {e}", entry.id()));
                        continue;
                    }
                }
            }

            if let Some(run_id) = run_id_of(entry.payload()) {
                match self.store.delete(&keys::run(run_id)).await {
                    Ok(()) => report.cleaned_runs += 1,
                    Err(e) => report.errors.push(format!("{}: run {run_id}: {e}", entry.id())),
                }
            }

            match self.store.delete(&key).await {
                Ok(()) => report.cleaned_jobs += 1,
                Err(e) => report.errors.push(format!("{}: {e}", entry.id())),
            }
        }

        tracing::info!(
            cleaned_jobs = report.cleaned_jobs,
            cleaned_blobs = report.cleaned_blobs,
            cleaned_runs = report.cleaned_runs,
            errors = report.errors.len(),
            older_than_days,
            "Dead-letter cleanup finished"
        );
        Ok(report)
    }

    /// Current queue statistics.
    pub async fn get_queue_stats(&self) -> AppResult<QueueStatistics> {
        let pending = self.pending_entries().await?;
        let dead_letters = self.store.scan_prefix(keys::DEAD_LETTER_PREFIX).await?;

        Ok(QueueStatistics {
            pending_jobs: pending.len() as u64,
            completed_jobs: self.counter(keys::STATS_COMPLETED).await?,
            failed_jobs: self.counter(keys::STATS_FAILED).await?,
            dead_letter_jobs: dead_letters.len() as u64,
            oldest_job_created: pending.iter().map(|(_, job)| job.created_at).min(),
        })
    }

    /// Merge a partial update into the running counters.
    pub async fn update_stats(&self, update: StatsUpdate) -> AppResult<()> {
        if let Some(delta) = update.completed_jobs {
            self.store.incr_by(keys::STATS_COMPLETED, delta).await?;
        }
        if let Some(delta) = update.failed_jobs {
            self.store.incr_by(keys::STATS_FAILED, delta).await?;
        }
        Ok(())
    }

    async fn counter(&self, key: &str) -> AppResult<u64> {
        match self.store.get(key).await? {
            Some(raw) => raw
                .parse::<i64>()
                .map(|v| v.max(0) as u64)
                .map_err(|_| AppError::storage(format!("Counter '{key}' is not an integer"))),
            None => Ok(0),
        }
    }

    async fn pending_entries(&self) -> AppResult<Vec<(String, Job)>> {
        let entries = self.store.scan_prefix(keys::PENDING_PREFIX).await?;
        Ok(entries
            .into_iter()
            .filter_map(|(key, raw)| match serde_json::from_str::<Job>(&raw) {
                Ok(job) => Some((key, job)),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Skipping unreadable pending job");
                    None
                }
            })
            .collect())
    }

    async fn dead_letter_entries(&self) -> AppResult<Vec<DeadLetterJob>> {
        let entries = self.store.scan_prefix(keys::DEAD_LETTER_PREFIX).await?;
        Ok(entries
            .into_iter()
            .filter_map(|(key, raw)| match serde_json::from_str::<DeadLetterJob>(&raw) {
                Ok(job) => Some(job),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Skipping unreadable dead-letter job");
                    None
                }
            })
            .collect())
    }
}

/// Blob referenced by an ingestion payload.
fn blob_key_of(payload: &serde_json::Value) -> Option<&str> {
    payload.get("blobKey").and_then(serde_json::Value::as_str)
}

fn run_id_of(payload: &serde_json::Value) -> Option<Uuid> {
    payload
        .get("runId")
        .and_then(serde_json::Value::as_str)
        .and_then(|raw| Uuid::parse_str(raw).ok())
}

fn chrono_duration(delay: Duration) -> chrono::Duration {
    chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX)
}
