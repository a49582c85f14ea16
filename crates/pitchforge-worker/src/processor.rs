//! Batch processing of queued ingestion jobs.
//!
//! One pass acquires the `process` lock and claims jobs one at a time as
//! workers free up, stopping at `batch_size` jobs or when the claim window
//! closes. Failures are routed to retry or the dead-letter set by error
//! kind. A panic while handling a job counts as a retryable failure of that
//! job. The lock is released on every exit path.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use pitchforge_core::config::queue::QueueConfig;
use pitchforge_core::error::{AppError, ErrorKind};
use pitchforge_core::result::AppResult;
use pitchforge_entity::job::model::INGESTION_JOB_TYPE;
use pitchforge_entity::{IngestionRequest, Job};

use crate::lock::{CLEANUP_LOCK, DistributedLock, PROCESS_LOCK};
use crate::metrics::MetricsReporter;
use crate::pipeline::PipelineOrchestrator;
use crate::queue::{CleanupReport, JobQueue};

/// Attempts at writing a failed job back to the queue before giving up.
const WRITE_BACK_ATTEMPTS: u32 = 3;

/// Pause between write-back attempts, multiplied by the attempt number.
const WRITE_BACK_PAUSE: Duration = Duration::from_millis(50);

/// A job attempt that failed during a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFailure {
    /// Failed job, absent when the failure happened before a job was claimed.
    pub job_id: Option<Uuid>,
    /// Attempt number of the failed job.
    pub attempt: u32,
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
    /// Payload of a job that could not be written back to the queue, so an
    /// operator can resubmit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl JobFailure {
    fn new(job: Option<&Job>, error: &AppError) -> Self {
        Self {
            job_id: job.map(|j| j.id),
            attempt: job.map(|j| j.attempt).unwrap_or(0),
            code: error.kind.code().to_string(),
            message: error.message.clone(),
            payload: None,
        }
    }

    fn with_payload(mut self, job: &Job) -> Self {
        self.payload = Some(job.payload.clone());
        self
    }
}

/// Result of one batch processing pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    /// Jobs claimed and handled.
    pub processed: u32,
    /// Jobs that completed.
    pub successful: u32,
    /// Jobs whose attempt failed.
    pub failed: u32,
    /// Failed jobs scheduled for another attempt.
    pub retried: u32,
    /// Failed jobs moved to the dead-letter set.
    pub dead_letter: u32,
    /// Wall time of the pass.
    pub processing_time_ms: u64,
    /// Failures in handling order.
    pub errors: Vec<JobFailure>,
    /// Whether the pass was skipped because the lock was held elsewhere.
    pub skipped: bool,
}

impl BatchSummary {
    /// Summary of a pass that did not run.
    pub fn skipped(elapsed: Duration) -> Self {
        Self {
            skipped: true,
            processing_time_ms: elapsed.as_millis() as u64,
            ..Default::default()
        }
    }

    fn absorb(&mut self, outcome: JobOutcome) {
        if !matches!(outcome, JobOutcome::ClaimFailed(_)) {
            self.processed += 1;
        }
        match outcome {
            JobOutcome::Succeeded => self.successful += 1,
            JobOutcome::Retried(failure) => {
                self.failed += 1;
                self.retried += 1;
                self.errors.push(failure);
            }
            JobOutcome::DeadLettered(failure) => {
                self.failed += 1;
                self.dead_letter += 1;
                self.errors.push(failure);
            }
            JobOutcome::Unrecorded(failure) => {
                self.failed += 1;
                self.errors.push(failure);
            }
            JobOutcome::ClaimFailed(failure) => self.errors.push(failure),
        }
    }
}

/// Result of a cleanup sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupSummary {
    /// Whether the sweep was skipped because the lock was held elsewhere.
    pub skipped: bool,
    /// What the sweep removed.
    #[serde(flatten)]
    pub report: CleanupReport,
}

enum JobOutcome {
    Succeeded,
    Retried(JobFailure),
    DeadLettered(JobFailure),
    /// The failure could not be written back to the queue.
    Unrecorded(JobFailure),
    /// No job was claimed because the queue could not be read.
    ClaimFailed(JobFailure),
}

/// Claims queued jobs and drives them through the pipeline.
#[derive(Debug, Clone)]
pub struct BatchProcessor {
    queue: JobQueue,
    lock: DistributedLock,
    orchestrator: Arc<PipelineOrchestrator>,
    metrics: Arc<MetricsReporter>,
    config: QueueConfig,
}

impl BatchProcessor {
    /// Create a processor.
    pub fn new(
        queue: JobQueue,
        lock: DistributedLock,
        orchestrator: Arc<PipelineOrchestrator>,
        metrics: Arc<MetricsReporter>,
        config: QueueConfig,
    ) -> Self {
        Self {
            queue,
            lock,
            orchestrator,
            metrics,
            config,
        }
    }

    /// The job queue.
    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// The lock client.
    pub fn lock(&self) -> &DistributedLock {
        &self.lock
    }

    /// Run one batch processing pass.
    ///
    /// Returns a skipped summary when another processor holds the lock. Only
    /// a failure to reach the lock itself is returned as an error; job and
    /// storage failures during the pass are reported in the summary.
    pub async fn process_batch(&self) -> AppResult<BatchSummary> {
        let started = Instant::now();
        if !self
            .lock
            .acquire(PROCESS_LOCK, self.config.process_lock_ttl())
            .await?
        {
            debug!("Batch processing already in progress elsewhere, skipping");
            let summary = BatchSummary::skipped(started.elapsed());
            self.metrics.record_batch(&summary);
            return Ok(summary);
        }

        let outcome = AssertUnwindSafe(self.drain(started)).catch_unwind().await;
        if let Err(e) = self.lock.release(PROCESS_LOCK).await {
            error!(error = %e, "Failed to release process lock");
        }

        let mut summary = outcome
            .map_err(|_| AppError::internal("batch processing pass panicked"))?;
        summary.processing_time_ms = started.elapsed().as_millis() as u64;
        self.metrics.record_batch(&summary);
        if started.elapsed() >= self.config.process_lock_ttl() {
            warn!(
                elapsed_ms = summary.processing_time_ms,
                "Batch pass outlived the process lock TTL"
            );
        }

        if summary.processed > 0 || !summary.errors.is_empty() {
            info!(
                processed = summary.processed,
                successful = summary.successful,
                retried = summary.retried,
                dead_letter = summary.dead_letter,
                elapsed_ms = summary.processing_time_ms,
                "Batch processed"
            );
        }
        Ok(summary)
    }

    async fn drain(&self, started: Instant) -> BatchSummary {
        let batch_size = self.config.batch_size;
        let claim_window = self.config.claim_window();

        // A job is claimed only once a worker slot is free for it, so no
        // claimed job waits behind running ones.
        let claims = stream::unfold(0usize, move |claimed| async move {
            if claimed >= batch_size {
                return None;
            }
            if started.elapsed() >= claim_window {
                debug!(claimed, "Claim window closed, leaving remaining jobs queued");
                return None;
            }
            match self.queue.dequeue().await {
                Ok(Some(job)) => Some((Ok(job), claimed + 1)),
                Ok(None) => None,
                Err(e) => {
                    error!(error = %e, "Failed to dequeue job");
                    Some((Err(e), batch_size))
                }
            }
        })
        .boxed();

        let outcomes: Vec<JobOutcome> = claims
            .map(|claim| async move {
                match claim {
                    Ok(job) => self.process_job(job).await,
                    Err(e) => JobOutcome::ClaimFailed(JobFailure::new(None, &e)),
                }
            })
            .buffer_unordered(self.config.batch_concurrency.max(1))
            .collect()
            .await;

        let mut summary = BatchSummary::default();
        for outcome in outcomes {
            summary.absorb(outcome);
        }
        summary
    }

    async fn process_job(&self, job: Job) -> JobOutcome {
        let started = Instant::now();
        debug!(job_id = %job.id, attempt = job.attempt, "Processing job");
        let handled = AssertUnwindSafe(self.execute(&job)).catch_unwind().await;
        let (result, panicked) = match handled {
            Ok(result) => (result, false),
            Err(panic) => (
                Err(AppError::internal(format!(
                    "job handling panicked: {}",
                    panic_message(panic.as_ref())
                ))),
                true,
            ),
        };
        let elapsed = started.elapsed();

        let error = match result {
            Ok(()) => {
                if let Err(e) = self.queue.complete(&job, elapsed).await {
                    warn!(job_id = %job.id, error = %e, "Failed to record job completion");
                }
                self.metrics.record_success(elapsed);
                return JobOutcome::Succeeded;
            }
            Err(error) => error,
        };

        self.metrics.record_failure(&error, elapsed);
        error!(
            job_id = %job.id,
            attempt = job.attempt,
            elapsed_ms = elapsed.as_millis() as u64,
            code = error.kind.code(),
            error = %error.message,
            "Job failed"
        );

        if panicked || error.is_retryable() {
            self.retry_or_dead_letter(job, &error, elapsed).await
        } else {
            self.dead_letter_now(job, &error).await
        }
    }

    async fn retry_or_dead_letter(
        &self,
        job: Job,
        error: &AppError,
        elapsed: Duration,
    ) -> JobOutcome {
        let failure = JobFailure::new(Some(&job), error);
        let message = error.to_string();

        let mut attempt = 1;
        let write_back = loop {
            match self.queue.schedule_retry(job.clone(), &message, elapsed).await {
                Ok(retried) => break Ok(retried),
                Err(e) if attempt < WRITE_BACK_ATTEMPTS => {
                    warn!(job_id = %job.id, attempt, error = %e, "Retry write-back failed");
                    tokio::time::sleep(WRITE_BACK_PAUSE * attempt).await;
                    attempt += 1;
                }
                Err(e) => break Err(e),
            }
        };

        match write_back {
            Ok(true) => {
                self.metrics.record_retry();
                JobOutcome::Retried(failure)
            }
            Ok(false) => {
                let exhausted = AppError::exhausted(format!(
                    "gave up after {} attempts: {}",
                    job.attempt + 1,
                    error.message
                ));
                self.abandon_run(&job, &exhausted.to_string()).await;
                self.metrics.record_dead_letter();
                JobOutcome::DeadLettered(JobFailure::new(Some(&job), &exhausted))
            }
            Err(e) => {
                error!(
                    job_id = %job.id,
                    error = %e,
                    "Could not re-enqueue job, moving it to the dead-letter set"
                );
                self.dead_letter_now(job, error).await
            }
        }
    }

    async fn dead_letter_now(&self, job: Job, error: &AppError) -> JobOutcome {
        let failure = JobFailure::new(Some(&job), error);
        let message = error.to_string();

        let mut attempt = 1;
        loop {
            match self.queue.dead_letter(job.clone(), &message).await {
                Ok(_) => {
                    self.abandon_run(&job, &message).await;
                    self.metrics.record_dead_letter();
                    return JobOutcome::DeadLettered(failure);
                }
                Err(e) if attempt < WRITE_BACK_ATTEMPTS => {
                    warn!(job_id = %job.id, attempt, error = %e, "Dead-letter write-back failed");
                    tokio::time::sleep(WRITE_BACK_PAUSE * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        job_id = %job.id,
                        payload = %job.payload,
                        error = %e,
                        "Failed to dead-letter job, it is no longer queued"
                    );
                    return JobOutcome::Unrecorded(failure.with_payload(&job));
                }
            }
        }
    }

    async fn execute(&self, job: &Job) -> AppResult<()> {
        let request = ingestion_request(job)?;
        let run = self.orchestrator.execute(&request).await?;
        debug!(job_id = %job.id, run_id = %run.id, progress = run.progress, "Job executed");
        Ok(())
    }

    async fn abandon_run(&self, job: &Job, error: &str) {
        let Ok(request) = ingestion_request(job) else {
            return;
        };
        if let Err(e) = self.orchestrator.runs().abandon(request.run_id, error).await {
            warn!(run_id = %request.run_id, error = %e, "Failed to mark run failed");
        }
    }

    /// Run one cleanup sweep of dead-letter jobs older than `older_than_days`.
    pub async fn run_cleanup(&self, older_than_days: u32) -> AppResult<CleanupSummary> {
        if !self
            .lock
            .acquire(CLEANUP_LOCK, self.config.cleanup_lock_ttl())
            .await?
        {
            debug!("Cleanup already in progress elsewhere, skipping");
            return Ok(CleanupSummary {
                skipped: true,
                ..Default::default()
            });
        }

        let outcome = AssertUnwindSafe(self.queue.cleanup_old_jobs(older_than_days))
            .catch_unwind()
            .await;
        if let Err(e) = self.lock.release(CLEANUP_LOCK).await {
            error!(error = %e, "Failed to release cleanup lock");
        }

        let report = outcome.map_err(|_| AppError::internal("cleanup sweep panicked"))??;
        Ok(CleanupSummary {
            skipped: false,
            report,
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

fn ingestion_request(job: &Job) -> AppResult<IngestionRequest> {
    if job.job_type != INGESTION_JOB_TYPE {
        return Err(AppError::new(
            ErrorKind::Validation,
            format!("unsupported job type '{}'", job.job_type),
        ));
    }
    serde_json::from_value(job.payload.clone())
        .map_err(|e| AppError::validation(format!("invalid ingestion payload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use bytes::Bytes;
    use serde_json::{Value, json};

    use pitchforge_core::config::offload::OffloadConfig;
    use pitchforge_core::config::pipeline::PipelineConfig;
    use pitchforge_core::traits::blob::BlobStore;
    use pitchforge_core::traits::store::QueueStore;
    use pitchforge_entity::{JobPriority, RunStatus, StepName};
    use pitchforge_store::memory::MemoryQueueStore;
    use pitchforge_store::{LocalBlobStore, keys};

    use crate::offload::{OffloadManager, RestrictedCapability};
    use crate::pipeline::{ContentGenerator, DeterministicGenerator, RunRepository, StepContext};
    use crate::queue::RetryPolicy;

    const SCRIPT: &[u8] = b"INT. OFFICE - DAY\n\nMEERA\nWe close the ledger tonight.\n";

    #[derive(Debug, Default)]
    struct FailingGenerator {
        failing: HashSet<StepName>,
    }

    #[async_trait]
    impl ContentGenerator for FailingGenerator {
        async fn generate(&self, step: StepName, context: &StepContext) -> AppResult<Value> {
            if self.failing.contains(&step) {
                return Err(AppError::step(format!("{step} failed")));
            }
            DeterministicGenerator.generate(step, context).await
        }

        fn substitute(&self, step: StepName, context: &StepContext) -> Value {
            DeterministicGenerator.substitute(step, context)
        }
    }

    /// Panics in core extraction for the first `panics` calls.
    #[derive(Debug)]
    struct PanickingGenerator {
        panics: AtomicUsize,
    }

    #[async_trait]
    impl ContentGenerator for PanickingGenerator {
        async fn generate(&self, step: StepName, context: &StepContext) -> AppResult<Value> {
            if step == StepName::CoreExtraction
                && self
                    .panics
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            {
                panic!("extraction model crashed");
            }
            DeterministicGenerator.generate(step, context).await
        }

        fn substitute(&self, step: StepName, context: &StepContext) -> Value {
            DeterministicGenerator.substitute(step, context)
        }
    }

    /// Memory store whose writes to selected key spaces can be switched off.
    #[derive(Debug, Default)]
    struct FlakyStore {
        inner: MemoryQueueStore,
        fail_pending: AtomicBool,
        fail_dead_letter: AtomicBool,
    }

    #[async_trait]
    impl QueueStore for FlakyStore {
        async fn get(&self, key: &str) -> AppResult<Option<String>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()> {
            let blocked = (key.starts_with(keys::PENDING_PREFIX)
                && self.fail_pending.load(Ordering::SeqCst))
                || (key.starts_with(keys::DEAD_LETTER_PREFIX)
                    && self.fail_dead_letter.load(Ordering::SeqCst));
            if blocked {
                return Err(AppError::storage(format!("write to '{key}' refused")));
            }
            self.inner.set(key, value, ttl).await
        }

        async fn delete(&self, key: &str) -> AppResult<()> {
            self.inner.delete(key).await
        }

        async fn take(&self, key: &str) -> AppResult<Option<String>> {
            self.inner.take(key).await
        }

        async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool> {
            self.inner.set_nx(key, value, ttl).await
        }

        async fn scan_prefix(&self, prefix: &str) -> AppResult<Vec<(String, String)>> {
            self.inner.scan_prefix(prefix).await
        }

        async fn incr_by(&self, key: &str, delta: i64) -> AppResult<i64> {
            self.inner.incr_by(key, delta).await
        }

        async fn health_check(&self) -> AppResult<bool> {
            self.inner.health_check().await
        }
    }

    struct Fixture {
        processor: BatchProcessor,
        store: Arc<dyn QueueStore>,
        _dir: tempfile::TempDir,
    }

    async fn fixture(failing: &[StepName], config: QueueConfig) -> Fixture {
        let generator = Arc::new(FailingGenerator {
            failing: failing.iter().copied().collect(),
        });
        fixture_with(Arc::new(MemoryQueueStore::new()), generator, config).await
    }

    async fn fixture_with(
        store: Arc<dyn QueueStore>,
        generator: Arc<dyn ContentGenerator>,
        config: QueueConfig,
    ) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let blobs = Arc::new(LocalBlobStore::new(dir.path()).await.unwrap());
        blobs
            .write("uploads/script.txt", Bytes::from_static(SCRIPT))
            .await
            .unwrap();

        let queue = JobQueue::new(store.clone(), blobs.clone(), RetryPolicy::from_config(&config));
        let offload = Arc::new(OffloadManager::with_capability(
            Arc::new(RestrictedCapability),
            &OffloadConfig::default(),
        ));
        let orchestrator = Arc::new(PipelineOrchestrator::new(
            RunRepository::new(store.clone()),
            blobs,
            offload,
            generator,
            PipelineConfig::default(),
        ));
        let processor = BatchProcessor::new(
            queue,
            DistributedLock::new(store.clone()),
            orchestrator,
            Arc::new(MetricsReporter::new()),
            config,
        );
        Fixture {
            processor,
            store,
            _dir: dir,
        }
    }

    async fn enqueue(processor: &BatchProcessor, blob_key: &str) -> Uuid {
        let run_id = Uuid::new_v4();
        let payload = json!({
            "runId": run_id,
            "blobKey": blob_key,
            "mimeType": "text/plain",
        });
        processor
            .queue()
            .enqueue(payload, JobPriority::Medium, None)
            .await
            .unwrap();
        run_id
    }

    async fn run_status(fx: &Fixture, run_id: Uuid) -> RunStatus {
        RunRepository::new(fx.store.clone())
            .get(run_id)
            .await
            .unwrap()
            .unwrap()
            .status
    }

    #[tokio::test]
    async fn test_successful_batch() {
        let fx = fixture(&[], QueueConfig::default()).await;
        let first = enqueue(&fx.processor, "uploads/script.txt").await;
        let second = enqueue(&fx.processor, "uploads/script.txt").await;

        let summary = fx.processor.process_batch().await.unwrap();
        assert!(!summary.skipped);
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(run_status(&fx, first).await, RunStatus::Succeeded);
        assert_eq!(run_status(&fx, second).await, RunStatus::Succeeded);

        let stats = fx.processor.queue().get_queue_stats().await.unwrap();
        assert_eq!(stats.completed_jobs, 2);
        assert_eq!(stats.pending_jobs, 0);
        assert!(!fx.processor.lock().is_locked(PROCESS_LOCK).await.unwrap());
    }

    #[tokio::test]
    async fn test_held_lock_skips_batch() {
        let fx = fixture(&[], QueueConfig::default()).await;
        enqueue(&fx.processor, "uploads/script.txt").await;
        let other = DistributedLock::new(fx.store.clone());
        assert!(other.acquire(PROCESS_LOCK, Duration::from_secs(60)).await.unwrap());

        let summary = fx.processor.process_batch().await.unwrap();
        assert!(summary.skipped);
        assert_eq!(summary.processed, 0);
        let stats = fx.processor.queue().get_queue_stats().await.unwrap();
        assert_eq!(stats.pending_jobs, 1);
        assert!(other.is_locked(PROCESS_LOCK).await.unwrap());
    }

    #[tokio::test]
    async fn test_batch_size_limits_claims() {
        let config = QueueConfig {
            batch_size: 2,
            ..Default::default()
        };
        let fx = fixture(&[], config).await;
        for _ in 0..3 {
            enqueue(&fx.processor, "uploads/script.txt").await;
        }
        let summary = fx.processor.process_batch().await.unwrap();
        assert_eq!(summary.processed, 2);
        let stats = fx.processor.queue().get_queue_stats().await.unwrap();
        assert_eq!(stats.pending_jobs, 1);
    }

    #[tokio::test]
    async fn test_non_retryable_failure_dead_letters() {
        let fx = fixture(&[], QueueConfig::default()).await;
        let run_id = enqueue(&fx.processor, "uploads/missing.txt").await;

        let summary = fx.processor.process_batch().await.unwrap();
        assert_eq!(summary.dead_letter, 1);
        assert_eq!(summary.retried, 0);
        assert_eq!(summary.errors[0].code, "not_found");
        assert_eq!(run_status(&fx, run_id).await, RunStatus::Failed);

        let stats = fx.processor.queue().get_queue_stats().await.unwrap();
        assert_eq!(stats.dead_letter_jobs, 1);
        assert_eq!(stats.pending_jobs, 0);
    }

    #[tokio::test]
    async fn test_retryable_failure_is_retried() {
        let failing = [
            StepName::CoreExtraction,
            StepName::CharacterBible,
            StepName::MarketAdaptation,
        ];
        let fx = fixture(&failing, QueueConfig::default()).await;
        let run_id = enqueue(&fx.processor, "uploads/script.txt").await;

        let summary = fx.processor.process_batch().await.unwrap();
        assert_eq!(summary.retried, 1);
        assert_eq!(summary.dead_letter, 0);
        assert_eq!(summary.errors[0].code, "step_error");
        assert_eq!(run_status(&fx, run_id).await, RunStatus::Running);

        let stats = fx.processor.queue().get_queue_stats().await.unwrap();
        assert_eq!(stats.pending_jobs, 1);
        // The retry is delayed, so an immediate pass finds nothing eligible.
        let summary = fx.processor.process_batch().await.unwrap();
        assert_eq!(summary.processed, 0);
    }

    #[tokio::test]
    async fn test_exhausted_retries_dead_letter() {
        let config = QueueConfig {
            max_attempts: 1,
            ..Default::default()
        };
        let fx = fixture(
            &[
                StepName::CoreExtraction,
                StepName::CharacterBible,
                StepName::MarketAdaptation,
            ],
            config,
        )
        .await;
        let run_id = enqueue(&fx.processor, "uploads/script.txt").await;

        let summary = fx.processor.process_batch().await.unwrap();
        assert_eq!(summary.dead_letter, 1);
        assert_eq!(summary.errors[0].code, "exhausted_error");
        assert_eq!(run_status(&fx, run_id).await, RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_invalid_payload_dead_letters() {
        let fx = fixture(&[], QueueConfig::default()).await;
        fx.processor
            .queue()
            .enqueue(json!({ "blob": 1 }), JobPriority::High, None)
            .await
            .unwrap();

        let summary = fx.processor.process_batch().await.unwrap();
        assert_eq!(summary.dead_letter, 1);
        assert_eq!(summary.errors[0].code, "validation_error");
    }

    #[tokio::test]
    async fn test_concurrent_batch() {
        let config = QueueConfig {
            batch_concurrency: 4,
            ..Default::default()
        };
        let fx = fixture(&[], config).await;
        for _ in 0..5 {
            enqueue(&fx.processor, "uploads/script.txt").await;
        }
        let summary = fx.processor.process_batch().await.unwrap();
        assert_eq!(summary.successful, 5);
    }

    #[tokio::test]
    async fn test_panicking_job_is_retried_and_batch_continues() {
        let generator = Arc::new(PanickingGenerator {
            panics: AtomicUsize::new(1),
        });
        let fx = fixture_with(
            Arc::new(MemoryQueueStore::new()),
            generator,
            QueueConfig::default(),
        )
        .await;
        for _ in 0..3 {
            enqueue(&fx.processor, "uploads/script.txt").await;
        }

        let summary = fx.processor.process_batch().await.unwrap();
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.retried, 1);
        assert_eq!(summary.dead_letter, 0);
        assert_eq!(summary.errors[0].code, "internal_error");
        assert!(summary.errors[0].message.contains("extraction model crashed"));

        let stats = fx.processor.queue().get_queue_stats().await.unwrap();
        assert_eq!(stats.pending_jobs, 1);
        assert_eq!(stats.completed_jobs, 2);
        assert!(!fx.processor.lock().is_locked(PROCESS_LOCK).await.unwrap());
    }

    #[tokio::test]
    async fn test_unwritable_retry_falls_back_to_dead_letter() {
        let store = Arc::new(FlakyStore::default());
        let generator = Arc::new(FailingGenerator {
            failing: [
                StepName::CoreExtraction,
                StepName::CharacterBible,
                StepName::MarketAdaptation,
            ]
            .into_iter()
            .collect(),
        });
        let fx = fixture_with(store.clone(), generator, QueueConfig::default()).await;
        let run_id = enqueue(&fx.processor, "uploads/script.txt").await;
        store.fail_pending.store(true, Ordering::SeqCst);

        let summary = fx.processor.process_batch().await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.retried, 0);
        assert_eq!(summary.dead_letter, 1);
        assert_eq!(run_status(&fx, run_id).await, RunStatus::Failed);

        let stats = fx.processor.queue().get_queue_stats().await.unwrap();
        assert_eq!(stats.pending_jobs, 0);
        assert_eq!(stats.dead_letter_jobs, 1);
    }

    #[tokio::test]
    async fn test_unrecorded_failure_carries_payload() {
        let store = Arc::new(FlakyStore::default());
        let fx = fixture_with(
            store.clone(),
            Arc::new(FailingGenerator::default()),
            QueueConfig::default(),
        )
        .await;
        let run_id = enqueue(&fx.processor, "uploads/missing.txt").await;
        store.fail_pending.store(true, Ordering::SeqCst);
        store.fail_dead_letter.store(true, Ordering::SeqCst);

        let summary = fx.processor.process_batch().await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.dead_letter, 0);
        let payload = summary.errors[0].payload.as_ref().unwrap();
        assert_eq!(payload["runId"], json!(run_id));
        assert_eq!(payload["blobKey"], "uploads/missing.txt");
    }

    #[tokio::test]
    async fn test_closed_claim_window_leaves_jobs_queued() {
        let config = QueueConfig {
            claim_window_seconds: 0,
            ..Default::default()
        };
        let fx = fixture(&[], config).await;
        enqueue(&fx.processor, "uploads/script.txt").await;
        enqueue(&fx.processor, "uploads/script.txt").await;

        let summary = fx.processor.process_batch().await.unwrap();
        assert!(!summary.skipped);
        assert_eq!(summary.processed, 0);
        let stats = fx.processor.queue().get_queue_stats().await.unwrap();
        assert_eq!(stats.pending_jobs, 2);
        assert!(!fx.processor.lock().is_locked(PROCESS_LOCK).await.unwrap());
    }

    #[tokio::test]
    async fn test_cleanup_respects_lock() {
        let fx = fixture(&[], QueueConfig::default()).await;
        let other = DistributedLock::new(fx.store.clone());
        other.acquire(CLEANUP_LOCK, Duration::from_secs(60)).await.unwrap();
        assert!(fx.processor.run_cleanup(7).await.unwrap().skipped);

        other.release(CLEANUP_LOCK).await.unwrap();
        let summary = fx.processor.run_cleanup(7).await.unwrap();
        assert!(!summary.skipped);
        assert_eq!(summary.report.cleaned_jobs, 0);
        assert!(!fx.processor.lock().is_locked(CLEANUP_LOCK).await.unwrap());
    }
}
