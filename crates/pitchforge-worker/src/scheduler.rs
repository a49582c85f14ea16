//! In-process interval scheduler for batch processing and cleanup.
//!
//! Deployments with an external scheduler disable this and call the HTTP
//! trigger instead. Both paths end in the same [`BatchProcessor`] calls, so
//! the distributed locks keep them from overlapping.

use std::sync::Arc;

use tokio_cron_scheduler::{Job as CronJob, JobScheduler};

use pitchforge_core::config::scheduler::SchedulerConfig;
use pitchforge_core::error::AppError;

use crate::processor::BatchProcessor;

/// Cron-driven trigger of batch processing and cleanup sweeps.
pub struct IntervalScheduler {
    scheduler: JobScheduler,
    processor: Arc<BatchProcessor>,
    config: SchedulerConfig,
    cleanup_older_than_days: u32,
}

impl std::fmt::Debug for IntervalScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntervalScheduler")
            .field("process_cron", &self.config.process_cron)
            .field("cleanup_cron", &self.config.cleanup_cron)
            .finish()
    }
}

impl IntervalScheduler {
    /// Create a scheduler. Nothing runs until [`start`](Self::start).
    pub async fn new(
        processor: Arc<BatchProcessor>,
        config: SchedulerConfig,
        cleanup_older_than_days: u32,
    ) -> Result<Self, AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::internal(format!("Failed to create scheduler: {e}")))?;

        Ok(Self {
            scheduler,
            processor,
            config,
            cleanup_older_than_days,
        })
    }

    /// Register the batch processing and cleanup schedules.
    pub async fn register_default_tasks(&self) -> Result<(), AppError> {
        self.register_batch_processing().await?;
        self.register_cleanup().await?;
        tracing::info!("All scheduled tasks registered");
        Ok(())
    }

    /// Start the scheduler.
    pub async fn start(&self) -> Result<(), AppError> {
        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::internal(format!("Failed to start scheduler: {e}")))?;

        tracing::info!("Interval scheduler started");
        Ok(())
    }

    /// Shut the scheduler down. A pass already running completes on its own.
    pub async fn shutdown(&mut self) -> Result<(), AppError> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::internal(format!("Failed to shutdown scheduler: {e}")))?;

        tracing::info!("Interval scheduler shut down");
        Ok(())
    }

    async fn register_batch_processing(&self) -> Result<(), AppError> {
        let processor = Arc::clone(&self.processor);
        let job = CronJob::new_async(self.config.process_cron.as_str(), move |_uuid, _lock| {
            let processor = Arc::clone(&processor);
            Box::pin(async move {
                match processor.process_batch().await {
                    Ok(summary) if summary.skipped => {
                        tracing::debug!("Scheduled batch skipped, lock held")
                    }
                    Ok(summary) => tracing::debug!(
                        processed = summary.processed,
                        successful = summary.successful,
                        "Scheduled batch finished"
                    ),
                    Err(e) => tracing::error!("Scheduled batch processing failed: {}", e),
                }
            })
        })
        .map_err(|e| {
            AppError::configuration(format!("Invalid batch processing schedule: {e}"))
        })?;

        self.scheduler.add(job).await.map_err(|e| {
            AppError::internal(format!("Failed to add batch processing schedule: {e}"))
        })?;

        tracing::info!("Registered: batch_processing ({})", self.config.process_cron);
        Ok(())
    }

    async fn register_cleanup(&self) -> Result<(), AppError> {
        let processor = Arc::clone(&self.processor);
        let days = self.cleanup_older_than_days;
        let job = CronJob::new_async(self.config.cleanup_cron.as_str(), move |_uuid, _lock| {
            let processor = Arc::clone(&processor);
            Box::pin(async move {
                match processor.run_cleanup(days).await {
                    Ok(summary) if summary.skipped => {
                        tracing::debug!("Scheduled cleanup skipped, lock held")
                    }
                    Ok(summary) => tracing::info!(
                        cleaned_jobs = summary.report.cleaned_jobs,
                        cleaned_blobs = summary.report.cleaned_blobs,
                        "Scheduled cleanup finished"
                    ),
                    Err(e) => tracing::error!("Scheduled cleanup failed: {}", e),
                }
            })
        })
        .map_err(|e| AppError::configuration(format!("Invalid cleanup schedule: {e}")))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::internal(format!("Failed to add cleanup schedule: {e}")))?;

        tracing::info!(
            "Registered: dead_letter_cleanup ({}, older than {} days)",
            self.config.cleanup_cron,
            days
        );
        Ok(())
    }
}
