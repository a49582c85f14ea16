//! # pitchforge-worker
//!
//! Asynchronous job processing for PitchForge:
//!
//! - [`queue`]: durable priority queue with retry backoff and a dead-letter set
//! - [`lock`]: TTL-bounded distributed locks
//! - [`offload`]: text/OCR extraction in a separate worker process, with an
//!   in-process fallback
//! - [`pipeline`]: the step orchestrator turning an upload into a pitch package
//! - [`processor`]: lock-guarded batch passes and cleanup sweeps
//! - [`scheduler`]: cron-driven triggering of those passes
//! - [`metrics`]: counters, latency percentiles and the health report

pub mod lock;
pub mod metrics;
pub mod offload;
pub mod pipeline;
pub mod processor;
pub mod queue;
pub mod scheduler;

pub use lock::DistributedLock;
pub use metrics::{HealthReport, MetricsReporter};
pub use offload::OffloadManager;
pub use pipeline::PipelineOrchestrator;
pub use processor::{BatchProcessor, BatchSummary};
pub use queue::JobQueue;
pub use scheduler::IntervalScheduler;
