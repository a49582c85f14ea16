//! Worker offload: CPU-heavy extraction in a child process, with a
//! synchronous in-process fallback that produces the same result.

pub mod capability;
pub mod engine;
pub mod error;
pub mod manager;
pub mod protocol;

pub use capability::{OffloadCapability, ProcessCapability, RestrictedCapability};
pub use engine::ExtractionEngine;
pub use error::OffloadError;
pub use manager::{CapabilityState, OffloadManager, OffloadStats};
pub use protocol::{ExtractionTask, WorkerMessage};
