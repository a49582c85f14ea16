//! Pipeline runs and their steps.

pub mod run;
pub mod step;

pub use run::{PipelineRun, RunStatus};
pub use step::{Step, StepName, StepStatus};
