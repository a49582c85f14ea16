//! Queued jobs, priorities, the dead-letter archive and queue statistics.

pub mod dead_letter;
pub mod model;
pub mod priority;
pub mod stats;

pub use dead_letter::DeadLetterJob;
pub use model::Job;
pub use priority::JobPriority;
pub use stats::{QueueStatistics, StatsUpdate};
