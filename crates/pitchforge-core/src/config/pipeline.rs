//! Pipeline orchestration configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// What the orchestrator does when a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Mark the run failed and stop.
    Abort,
    /// Record the failure and continue with a deterministic stub output.
    Substitute,
}

/// Pipeline orchestration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of step failures after which the run is marked failed even
    /// if every failing step had a substitute.
    #[serde(default = "default_max_step_failures")]
    pub max_step_failures: u32,
    /// Per-step failure policy overrides keyed by step name
    /// (e.g. `"market-adaptation" = "abort"`).
    #[serde(default)]
    pub on_failure: HashMap<String, FailurePolicy>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_step_failures: default_max_step_failures(),
            on_failure: HashMap::new(),
        }
    }
}

fn default_max_step_failures() -> u32 {
    3
}
