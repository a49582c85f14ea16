//! Pipeline steps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name of a step in the fixed ingestion sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepName {
    /// Screenplay parsing of the extracted text.
    Preprocess,
    /// Logline, synopsis and themes.
    CoreExtraction,
    /// Character profiles.
    CharacterBible,
    /// Regional and platform recommendations.
    MarketAdaptation,
    /// Deck outline and budget.
    PackageAssembly,
    /// Visual brief for the deck.
    Visuals,
    /// Final package references.
    FinalPackage,
}

impl StepName {
    /// The fixed execution order. Never reordered.
    pub const SEQUENCE: [StepName; 7] = [
        Self::Preprocess,
        Self::CoreExtraction,
        Self::CharacterBible,
        Self::MarketAdaptation,
        Self::PackageAssembly,
        Self::Visuals,
        Self::FinalPackage,
    ];

    /// Progress weight of the step; the weights of the sequence sum to 100.
    pub fn weight(&self) -> u8 {
        match self {
            Self::Preprocess => 20,
            Self::CoreExtraction => 20,
            Self::CharacterBible => 15,
            Self::MarketAdaptation => 15,
            Self::PackageAssembly => 12,
            Self::Visuals => 10,
            Self::FinalPackage => 8,
        }
    }

    /// Return the step name as used in configuration and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preprocess => "preprocess",
            Self::CoreExtraction => "core-extraction",
            Self::CharacterBible => "character-bible",
            Self::MarketAdaptation => "market-adaptation",
            Self::PackageAssembly => "package-assembly",
            Self::Visuals => "visuals",
            Self::FinalPackage => "final-package",
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::SEQUENCE
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| format!("unknown pipeline step '{s}'"))
    }
}

/// Status of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Not started yet.
    Queued,
    /// Currently executing.
    Running,
    /// Finished with an output.
    Succeeded,
    /// Finished with an error (possibly with a substitute output).
    Failed,
    /// Never executed because the run was abandoned.
    Skipped,
}

impl StepStatus {
    /// Whether the step has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }
}

/// One named stage within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Step name.
    pub name: StepName,
    /// Current status.
    pub status: StepStatus,
    /// When the step last started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the step last finished.
    pub finished_at: Option<DateTime<Utc>>,
    /// Structured result.
    pub output: Option<serde_json::Value>,
    /// Error of the last failed execution.
    pub error: Option<String>,
    /// Whether `output` is a deterministic substitute for a failed execution.
    #[serde(default)]
    pub substituted: bool,
    /// Number of times the step has been executed.
    #[serde(default)]
    pub executions: u32,
}

impl Step {
    /// A queued step.
    pub fn queued(name: StepName) -> Self {
        Self {
            name,
            status: StepStatus::Queued,
            started_at: None,
            finished_at: None,
            output: None,
            error: None,
            substituted: false,
            executions: 0,
        }
    }

    /// Transition to running.
    pub fn start(&mut self) {
        self.status = StepStatus::Running;
        self.started_at = Some(Utc::now());
        self.finished_at = None;
        self.error = None;
        self.executions += 1;
    }

    /// Transition to succeeded with `output`.
    pub fn succeed(&mut self, output: serde_json::Value) {
        self.status = StepStatus::Succeeded;
        self.finished_at = Some(Utc::now());
        self.output = Some(output);
        self.substituted = false;
    }

    /// Transition to failed with `error`, optionally keeping a substitute output.
    pub fn fail(&mut self, error: impl Into<String>, substitute: Option<serde_json::Value>) {
        self.status = StepStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error.into());
        self.substituted = substitute.is_some();
        self.output = substitute;
    }
}
