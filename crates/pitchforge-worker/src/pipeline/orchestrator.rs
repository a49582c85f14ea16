//! Drives an ingestion through the fixed step sequence.
//!
//! The run record is persisted after every step transition, so a drive that
//! is interrupted can be replayed: steps that already succeeded are skipped
//! and progress never moves backwards.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, trace, warn};

use pitchforge_core::config::pipeline::{FailurePolicy, PipelineConfig};
use pitchforge_core::error::AppError;
use pitchforge_core::result::AppResult;
use pitchforge_core::traits::blob::BlobStore;
use pitchforge_entity::{IngestionRequest, PipelineRun, RunStatus, Step, StepName, StepStatus};

use super::generator::{ContentGenerator, StepContext};
use super::repository::RunRepository;
use crate::offload::OffloadManager;

/// Runs ingestion pipelines.
#[derive(Debug, Clone)]
pub struct PipelineOrchestrator {
    runs: RunRepository,
    blobs: Arc<dyn BlobStore>,
    offload: Arc<OffloadManager>,
    generator: Arc<dyn ContentGenerator>,
    config: PipelineConfig,
}

impl PipelineOrchestrator {
    /// Create an orchestrator.
    pub fn new(
        runs: RunRepository,
        blobs: Arc<dyn BlobStore>,
        offload: Arc<OffloadManager>,
        generator: Arc<dyn ContentGenerator>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            runs,
            blobs,
            offload,
            generator,
            config,
        }
    }

    /// The run repository.
    pub fn runs(&self) -> &RunRepository {
        &self.runs
    }

    /// Failure policy of `step`. `preprocess` aborts unless overridden; every
    /// other step substitutes.
    pub fn policy_for(&self, step: StepName) -> FailurePolicy {
        if let Some(policy) = self.config.on_failure.get(step.as_str()) {
            return *policy;
        }
        match step {
            StepName::Preprocess => FailurePolicy::Abort,
            _ => FailurePolicy::Substitute,
        }
    }

    /// Drive the run of `request` to completion.
    ///
    /// A run that already succeeded is returned unchanged. An error means the
    /// drive stopped early. The run then stays resumable and its `error`
    /// field names the cause. The error kind is the one of the failing step.
    pub async fn execute(&self, request: &IngestionRequest) -> AppResult<PipelineRun> {
        let mut run = match self.runs.get(request.run_id).await? {
            Some(run) => run,
            None => PipelineRun::new(request.run_id, request.project_id.clone()),
        };

        if run.status == RunStatus::Succeeded {
            debug!(run_id = %run.id, "Run already succeeded, nothing to replay");
            return Ok(run);
        }

        run.reopen();
        self.runs.save(&run).await?;
        info!(run_id = %run.id, progress = run.progress, "Pipeline drive started");

        for name in StepName::SEQUENCE {
            if step_of(&mut run, name)?.status == StepStatus::Succeeded {
                debug!(run_id = %run.id, step = %name, "Step already succeeded, skipping");
                continue;
            }
            self.run_step(&mut run, request, name).await?;
        }

        run.advance_progress();
        run.finish(RunStatus::Succeeded, None);
        self.runs.save(&run).await?;
        info!(
            run_id = %run.id,
            step_failures = run.step_failures,
            "Pipeline run succeeded"
        );
        Ok(run)
    }

    /// Execute one step of `run` and persist the outcome.
    ///
    /// A failure is either absorbed with a substitute output or returned,
    /// depending on the step's policy and the run's failure budget.
    pub async fn run_step(
        &self,
        run: &mut PipelineRun,
        request: &IngestionRequest,
        name: StepName,
    ) -> AppResult<()> {
        let context = StepContext::new(request.clone(), run.outputs());
        step_of(run, name)?.start();
        self.runs.save(run).await?;
        debug!(run_id = %run.id, step = %name, "Step started");

        let outcome = match name {
            StepName::Preprocess => self.preprocess(request).await,
            other => self.generator.generate(other, &context).await,
        };

        let error = match outcome {
            Ok(output) => {
                step_of(run, name)?.succeed(output);
                run.advance_progress();
                self.runs.save(run).await?;
                debug!(run_id = %run.id, step = %name, progress = run.progress, "Step succeeded");
                return Ok(());
            }
            Err(error) => error,
        };

        run.step_failures += 1;
        let policy = self.policy_for(name);
        let substitute = match policy {
            FailurePolicy::Substitute => Some(self.generator.substitute(name, &context)),
            FailurePolicy::Abort => None,
        };
        step_of(run, name)?.fail(error.to_string(), substitute);
        run.advance_progress();

        let stop = if policy == FailurePolicy::Abort {
            Some(AppError::new(error.kind, format!("step {name} failed: {}", error.message)))
        } else if run.step_failures >= self.config.max_step_failures {
            Some(AppError::step(format!(
                "run reached {} step failures, last in {name}: {}",
                run.step_failures, error.message
            )))
        } else {
            None
        };

        match stop {
            Some(stop) => {
                run.error = Some(stop.to_string());
                self.runs.save(run).await?;
                warn!(run_id = %run.id, step = %name, error = %stop, "Pipeline drive stopped");
                Err(stop)
            }
            None => {
                self.runs.save(run).await?;
                warn!(
                    run_id = %run.id,
                    step = %name,
                    error = %error,
                    "Step failed, continuing with substitute output"
                );
                Ok(())
            }
        }
    }

    async fn preprocess(&self, request: &IngestionRequest) -> AppResult<Value> {
        let data = self.blobs.read(&request.blob_key).await?;
        let run_id = request.run_id;
        let extraction = self
            .offload
            .process_job(&data, request.extraction_kind(), move |percent| {
                trace!(run_id = %run_id, percent, "Extraction progress");
            })
            .await?;
        Ok(serde_json::to_value(&extraction)?)
    }
}

fn step_of(run: &mut PipelineRun, name: StepName) -> AppResult<&mut Step> {
    let run_id = run.id;
    run.step_mut(name)
        .ok_or_else(|| AppError::internal(format!("run {run_id} has no {name} step")))
}
