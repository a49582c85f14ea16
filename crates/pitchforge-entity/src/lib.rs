//! # pitchforge-entity
//!
//! Serializable domain models shared by the store, the worker and the API:
//! queued jobs and their dead-letter archive, lock entries, queue
//! statistics, pipeline runs with their steps, ingestion requests and
//! extraction results.

pub mod extraction;
pub mod ingestion;
pub mod job;
pub mod lock;
pub mod pipeline;

pub use extraction::{ExtractionKind, ExtractionResult};
pub use ingestion::IngestionRequest;
pub use job::{DeadLetterJob, Job, JobPriority, QueueStatistics, StatsUpdate};
pub use lock::LockEntry;
pub use pipeline::{PipelineRun, RunStatus, Step, StepName, StepStatus};
