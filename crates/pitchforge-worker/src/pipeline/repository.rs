//! Persistence of pipeline runs in the queue store.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

use pitchforge_core::result::AppResult;
use pitchforge_core::traits::store::{QueueStore, get_json, set_json};
use pitchforge_entity::{PipelineRun, RunStatus, StepName};
use pitchforge_store::keys;

/// Reads and writes `run:{id}` records.
#[derive(Debug, Clone)]
pub struct RunRepository {
    store: Arc<dyn QueueStore>,
}

impl RunRepository {
    /// Create a repository over `store`.
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self { store }
    }

    /// Create a queued run unless one already exists. Returns the stored run.
    pub async fn create(&self, run_id: Uuid, project_id: Option<String>) -> AppResult<PipelineRun> {
        if let Some(existing) = self.get(run_id).await? {
            return Ok(existing);
        }
        let run = PipelineRun::new(run_id, project_id);
        self.save(&run).await?;
        Ok(run)
    }

    /// Load a run.
    pub async fn get(&self, run_id: Uuid) -> AppResult<Option<PipelineRun>> {
        get_json(self.store.as_ref(), &keys::run(run_id)).await
    }

    /// Persist a run.
    pub async fn save(&self, run: &PipelineRun) -> AppResult<()> {
        set_json(self.store.as_ref(), &keys::run(run.id), run, None).await
    }

    /// Fail a run whose job was dead-lettered. Steps that never ran are
    /// marked skipped.
    pub async fn abandon(&self, run_id: Uuid, error: &str) -> AppResult<Option<PipelineRun>> {
        let Some(mut run) = self.get(run_id).await? else {
            return Ok(None);
        };
        if run.status == RunStatus::Succeeded {
            return Ok(Some(run));
        }
        run.abandon(error);
        self.save(&run).await?;
        info!(run_id = %run_id, "Pipeline run abandoned");
        Ok(Some(run))
    }

    /// Outputs of a finished run, keyed by step name, plus the final package.
    ///
    /// Returns `None` while the run is unknown or not terminal.
    pub async fn package(&self, run_id: Uuid) -> AppResult<Option<Map<String, Value>>> {
        let Some(run) = self.get(run_id).await? else {
            return Ok(None);
        };
        if !run.status.is_terminal() {
            return Ok(None);
        }
        let mut outputs = run.outputs();
        outputs.remove(StepName::Preprocess.as_str());
        Ok(Some(outputs))
    }
}
