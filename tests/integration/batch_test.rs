//! Integration tests for queue ordering, retry exhaustion and processing
//! exclusion across processors sharing one store.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{TimeZone, Utc};
use serde_json::json;
use tempfile::TempDir;
use uuid::Uuid;

use pitchforge_core::config::offload::{OffloadConfig, RuntimeKind};
use pitchforge_core::config::pipeline::PipelineConfig;
use pitchforge_core::config::queue::QueueConfig;
use pitchforge_core::traits::blob::BlobStore;
use pitchforge_core::traits::store::QueueStore;
use pitchforge_core::types::pagination::PageRequest;
use pitchforge_entity::{IngestionRequest, Job, JobPriority, RunStatus};
use pitchforge_store::LocalBlobStore;
use pitchforge_store::memory::MemoryQueueStore;
use pitchforge_worker::pipeline::{DeterministicGenerator, RunRepository};
use pitchforge_worker::queue::{DeadLetterFilter, RetryPolicy};
use pitchforge_worker::{
    BatchProcessor, DistributedLock, JobQueue, MetricsReporter, OffloadManager,
    PipelineOrchestrator,
};

const SCRIPT: &str = "INT. TEA ESTATE - MORNING\n\nKAVYA\nThe monsoon is late again.\n";

struct Fixture {
    store: Arc<dyn QueueStore>,
    blobs: Arc<dyn BlobStore>,
    config: QueueConfig,
    _dir: TempDir,
}

impl Fixture {
    async fn new(config: QueueConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let blobs: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(dir.path()).await.unwrap());
        Self {
            store: Arc::new(MemoryQueueStore::new()),
            blobs,
            config,
            _dir: dir,
        }
    }

    fn queue(&self) -> JobQueue {
        JobQueue::new(
            self.store.clone(),
            self.blobs.clone(),
            RetryPolicy::from_config(&self.config),
        )
    }

    fn runs(&self) -> RunRepository {
        RunRepository::new(self.store.clone())
    }

    /// A processor with its own lock holder, as a second instance would have.
    fn processor(&self) -> BatchProcessor {
        let offload_config = OffloadConfig {
            runtime: RuntimeKind::Restricted,
            ..Default::default()
        };
        let orchestrator = Arc::new(PipelineOrchestrator::new(
            self.runs(),
            self.blobs.clone(),
            Arc::new(OffloadManager::new(&offload_config)),
            Arc::new(DeterministicGenerator),
            PipelineConfig::default(),
        ));
        BatchProcessor::new(
            self.queue(),
            DistributedLock::new(self.store.clone()),
            orchestrator,
            Arc::new(MetricsReporter::new()),
            self.config.clone(),
        )
    }

    /// Store the script, create its run and enqueue the job.
    async fn submit(&self, priority: JobPriority) -> (Uuid, Uuid) {
        let run_id = Uuid::new_v4();
        let blob_key = format!("uploads/{run_id}/script.txt");
        self.blobs
            .write(&blob_key, Bytes::from_static(SCRIPT.as_bytes()))
            .await
            .unwrap();
        self.runs().create(run_id, None).await.unwrap();

        let request = IngestionRequest {
            run_id,
            project_id: None,
            blob_key,
            mime_type: Some("text/plain".to_string()),
            kind: None,
            region: None,
            platforms: Vec::new(),
        };
        let job_id = self
            .queue()
            .enqueue(serde_json::to_value(&request).unwrap(), priority, None)
            .await
            .unwrap();
        (run_id, job_id)
    }
}

fn immediate_retries(max_attempts: u32) -> QueueConfig {
    QueueConfig {
        max_attempts,
        backoff_base_ms: 0,
        backoff_cap_ms: 0,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_dequeue_by_priority_then_age() {
    let fixture = Fixture::new(QueueConfig::default()).await;
    let queue = fixture.queue();

    let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let a = Job::new("ingestion", json!({ "name": "A" }), JobPriority::Low).created_at(base);
    let b = Job::new("ingestion", json!({ "name": "B" }), JobPriority::Medium)
        .created_at(base + chrono::Duration::seconds(1));
    let c = Job::new("ingestion", json!({ "name": "C" }), JobPriority::High)
        .created_at(base + chrono::Duration::seconds(2));
    let d = Job::new("ingestion", json!({ "name": "D" }), JobPriority::Medium)
        .created_at(base + chrono::Duration::seconds(3));

    for job in [&a, &b, &c, &d] {
        queue.enqueue_job(job.clone()).await.unwrap();
    }

    let mut order = Vec::new();
    while let Some(job) = queue.dequeue().await.unwrap() {
        order.push(job.payload["name"].as_str().unwrap().to_string());
    }
    assert_eq!(order, vec!["C", "B", "D", "A"]);
}

#[tokio::test]
async fn test_delayed_job_waits() {
    let fixture = Fixture::new(QueueConfig::default()).await;
    let queue = fixture.queue();

    queue
        .enqueue(json!({}), JobPriority::Urgent, Some(Duration::from_secs(60)))
        .await
        .unwrap();

    assert!(queue.dequeue().await.unwrap().is_none());
    assert_eq!(queue.get_queue_stats().await.unwrap().pending_jobs, 1);
}

#[tokio::test]
async fn test_retry_until_dead_letter() {
    let fixture = Fixture::new(immediate_retries(5)).await;
    let queue = fixture.queue();
    let job_id = queue
        .enqueue(json!({ "x": 1 }), JobPriority::Medium, None)
        .await
        .unwrap();

    let mut outcomes = Vec::new();
    for _ in 0..5 {
        let job = queue.dequeue().await.unwrap().expect("job is eligible");
        assert_eq!(job.id, job_id);
        outcomes.push(
            queue
                .schedule_retry(job, "upstream unavailable", Duration::from_millis(5))
                .await
                .unwrap(),
        );
    }
    assert_eq!(outcomes, vec![true, true, true, true, false]);
    assert!(queue.dequeue().await.unwrap().is_none());

    let (items, total) = queue
        .get_dead_letter_jobs(&PageRequest::new(1, 25), &DeadLetterFilter::default())
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(items[0].id(), job_id);
    assert_eq!(items[0].retry_count, 5);
    assert_eq!(items[0].last_error, "upstream unavailable");

    let stats = queue.get_queue_stats().await.unwrap();
    assert_eq!(stats.failed_jobs, 1);
    assert_eq!(stats.dead_letter_jobs, 1);
    assert_eq!(stats.pending_jobs, 0);
}

#[tokio::test]
async fn test_concurrent_dequeue_claims_each_job_once() {
    let fixture = Fixture::new(QueueConfig::default()).await;
    let queue = fixture.queue();
    for _ in 0..5 {
        queue.enqueue(json!({}), JobPriority::Medium, None).await.unwrap();
    }

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue().await.unwrap() })
        })
        .collect();

    let mut claimed = HashSet::new();
    for handle in handles {
        if let Some(job) = handle.await.unwrap() {
            assert!(claimed.insert(job.id), "job claimed twice");
        }
    }
    assert_eq!(claimed.len(), 5);
}

#[tokio::test]
async fn test_held_lock_skips_processing() {
    let fixture = Fixture::new(QueueConfig::default()).await;
    let (run_id, _) = fixture.submit(JobPriority::Medium).await;

    let elsewhere = DistributedLock::new(fixture.store.clone());
    assert!(
        elsewhere
            .acquire("process", Duration::from_secs(300))
            .await
            .unwrap()
    );

    let processor = fixture.processor();
    let summary = processor.process_batch().await.unwrap();
    assert!(summary.skipped);
    assert_eq!(summary.processed, 0);
    assert_eq!(fixture.queue().get_queue_stats().await.unwrap().pending_jobs, 1);

    // The held lock is untouched by the skipped pass.
    let entry = elsewhere.inspect("process").await.unwrap().unwrap();
    assert_eq!(entry.holder, elsewhere.holder());

    elsewhere.release("process").await.unwrap();
    let summary = processor.process_batch().await.unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.successful, 1);

    let run = fixture.runs().get(run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(run.progress, 100);
}

#[tokio::test]
async fn test_competing_processors_handle_each_job_once() {
    let fixture = Fixture::new(QueueConfig::default()).await;
    for priority in [JobPriority::Low, JobPriority::High, JobPriority::Medium] {
        fixture.submit(priority).await;
    }

    let first = fixture.processor();
    let second = fixture.processor();
    let (a, b) = tokio::join!(first.process_batch(), second.process_batch());
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.processed + b.processed, 3);
    assert_eq!(a.successful + b.successful, 3);

    let stats = fixture.queue().get_queue_stats().await.unwrap();
    assert_eq!(stats.pending_jobs, 0);
    assert_eq!(stats.completed_jobs, 3);
    assert!(!DistributedLock::new(fixture.store.clone())
        .is_locked("process")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_expired_lock_can_be_taken_over() {
    let fixture = Fixture::new(QueueConfig::default()).await;
    let crashed = DistributedLock::new(fixture.store.clone());
    let successor = DistributedLock::new(fixture.store.clone());

    assert!(
        crashed
            .acquire("cleanup", Duration::from_millis(50))
            .await
            .unwrap()
    );
    assert!(
        !successor
            .acquire("cleanup", Duration::from_millis(50))
            .await
            .unwrap()
    );

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(
        successor
            .acquire("cleanup", Duration::from_secs(60))
            .await
            .unwrap()
    );
}
