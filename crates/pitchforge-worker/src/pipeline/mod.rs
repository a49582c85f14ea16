//! Ingestion pipeline: step content generation, run persistence and the
//! orchestrator driving the fixed step sequence.

pub mod generator;
pub mod orchestrator;
pub mod repository;

pub use generator::{ContentGenerator, DeterministicGenerator, StepContext};
pub use orchestrator::PipelineOrchestrator;
pub use repository::RunRepository;
