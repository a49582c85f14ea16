//! Pipeline run model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::step::{Step, StepName, StepStatus};

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Created, waiting for the orchestrator.
    Queued,
    /// Being driven by the orchestrator.
    Running,
    /// Every step reached a terminal state without aborting.
    Succeeded,
    /// Aborted by a critical step or too many step failures.
    Failed,
}

impl RunStatus {
    /// Whether the run has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// One end-to-end execution of the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRun {
    /// Run identifier.
    pub id: Uuid,
    /// Owning project, if any.
    pub project_id: Option<String>,
    /// Overall status.
    pub status: RunStatus,
    /// Overall progress percentage, never decreasing.
    pub progress: u8,
    /// Steps in the fixed sequence order.
    pub steps: Vec<Step>,
    /// Failed step executions during the current drive of the run.
    #[serde(default)]
    pub step_failures: u32,
    /// Reason the run failed.
    pub error: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
    /// When the run reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    /// Create a queued run with every step queued.
    pub fn new(id: Uuid, project_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            project_id,
            status: RunStatus::Queued,
            progress: 0,
            steps: StepName::SEQUENCE.into_iter().map(Step::queued).collect(),
            step_failures: 0,
            error: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    /// Look up a step.
    pub fn step(&self, name: StepName) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Look up a step mutably.
    pub fn step_mut(&mut self, name: StepName) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.name == name)
    }

    /// Whether every step has reached a terminal state.
    pub fn all_steps_terminal(&self) -> bool {
        self.steps.iter().all(|s| s.status.is_terminal())
    }

    /// Recompute progress from completed steps without ever lowering it.
    ///
    /// A step counts once it has succeeded or failed; skipped steps never
    /// executed and do not count.
    pub fn advance_progress(&mut self) {
        let completed: u32 = self
            .steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Succeeded | StepStatus::Failed))
            .map(|s| s.name.weight() as u32)
            .sum();
        let completed = completed.min(100) as u8;
        if completed > self.progress {
            self.progress = completed;
        }
        self.updated_at = Utc::now();
    }

    /// Outputs of the steps that produced one, keyed by step name.
    pub fn outputs(&self) -> serde_json::Map<String, serde_json::Value> {
        self.steps
            .iter()
            .filter_map(|s| {
                s.output
                    .as_ref()
                    .map(|o| (s.name.as_str().to_string(), o.clone()))
            })
            .collect()
    }

    /// Move to a terminal status.
    pub fn finish(&mut self, status: RunStatus, error: Option<String>) {
        let now = Utc::now();
        self.status = status;
        self.error = error;
        self.updated_at = now;
        self.finished_at = Some(now);
    }

    /// Resume a run for another drive.
    ///
    /// Skipped steps become queued again; succeeded steps are kept.
    pub fn reopen(&mut self) {
        for step in &mut self.steps {
            if matches!(step.status, StepStatus::Skipped | StepStatus::Running) {
                step.status = StepStatus::Queued;
            }
        }
        self.status = RunStatus::Running;
        self.step_failures = 0;
        self.error = None;
        self.finished_at = None;
        self.updated_at = Utc::now();
    }

    /// Mark every step that never ran as skipped and fail the run.
    ///
    /// Used when the job driving this run is dead-lettered.
    pub fn abandon(&mut self, error: impl Into<String>) {
        for step in &mut self.steps {
            if matches!(step.status, StepStatus::Queued | StepStatus::Running) {
                step.status = StepStatus::Skipped;
            }
        }
        self.finish(RunStatus::Failed, Some(error.into()));
    }
}
