//! Application state shared across all handlers.

use std::sync::Arc;

use pitchforge_core::config::AppConfig;
use pitchforge_core::traits::blob::BlobStore;
use pitchforge_core::traits::store::QueueStore;
use pitchforge_store::StoreManager;
use pitchforge_worker::metrics::HealthReport;
use pitchforge_worker::pipeline::{
    ContentGenerator, DeterministicGenerator, PipelineOrchestrator, RunRepository,
};
use pitchforge_worker::queue::RetryPolicy;
use pitchforge_worker::{BatchProcessor, DistributedLock, JobQueue, MetricsReporter, OffloadManager};

/// Application state containing all shared dependencies.
///
/// Passed to every Axum handler via `State<AppState>`. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Queue store manager
    pub store: Arc<StoreManager>,
    /// Uploaded script storage
    pub blobs: Arc<dyn BlobStore>,
    /// Job queue
    pub queue: JobQueue,
    /// Distributed lock client
    pub lock: DistributedLock,
    /// Pipeline run records
    pub runs: RunRepository,
    /// Worker offload manager
    pub offload: Arc<OffloadManager>,
    /// Batch processor behind the trigger
    pub processor: Arc<BatchProcessor>,
    /// Processing metrics
    pub metrics: Arc<MetricsReporter>,
}

impl AppState {
    /// Wire the worker components on top of the given backends, using the
    /// deterministic content generator.
    pub fn new(
        config: AppConfig,
        store: Arc<StoreManager>,
        blobs: Arc<dyn BlobStore>,
        offload: Arc<OffloadManager>,
    ) -> Self {
        Self::with_generator(config, store, blobs, offload, Arc::new(DeterministicGenerator))
    }

    /// Wire the worker components with an explicit content generator.
    pub fn with_generator(
        config: AppConfig,
        store: Arc<StoreManager>,
        blobs: Arc<dyn BlobStore>,
        offload: Arc<OffloadManager>,
        generator: Arc<dyn ContentGenerator>,
    ) -> Self {
        let shared: Arc<dyn QueueStore> = store.clone();
        let queue = JobQueue::new(
            shared.clone(),
            blobs.clone(),
            RetryPolicy::from_config(&config.queue),
        );
        let lock = DistributedLock::new(shared.clone());
        let runs = RunRepository::new(shared);
        let metrics = Arc::new(MetricsReporter::new());

        let orchestrator = Arc::new(PipelineOrchestrator::new(
            runs.clone(),
            blobs.clone(),
            offload.clone(),
            generator,
            config.pipeline.clone(),
        ));
        let processor = Arc::new(BatchProcessor::new(
            queue.clone(),
            lock.clone(),
            orchestrator,
            metrics.clone(),
            config.queue.clone(),
        ));

        Self {
            config: Arc::new(config),
            store,
            blobs,
            queue,
            lock,
            runs,
            offload,
            processor,
            metrics,
        }
    }

    /// Current health of the job subsystem.
    pub async fn health(&self) -> HealthReport {
        self.metrics
            .report(
                self.store.as_ref(),
                self.store.provider_name(),
                &self.queue,
                &self.lock,
                &self.offload,
            )
            .await
    }
}
