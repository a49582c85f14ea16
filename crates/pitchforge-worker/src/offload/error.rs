//! Offload failures.

use std::time::Duration;

use thiserror::Error;

use pitchforge_core::error::{AppError, ErrorKind};

/// Errors from dispatching work to a background execution unit.
#[derive(Debug, Error)]
pub enum OffloadError {
    /// Offloading is not possible in this runtime.
    #[error("Offloading unavailable: {0}")]
    Unavailable(String),

    /// The execution unit could not be started.
    #[error("Failed to start worker: {0}")]
    Spawn(#[from] std::io::Error),

    /// The message channel to or from the unit broke.
    #[error("Worker channel error: {0}")]
    Channel(String),

    /// The unit ran the job and reported its failure.
    #[error("Worker failed: {0}")]
    Worker(AppError),

    /// The unit did not finish in time and was terminated.
    #[error("Worker timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

impl From<OffloadError> for AppError {
    fn from(err: OffloadError) -> Self {
        let kind = match err {
            OffloadError::Worker(inner) => return inner,
            OffloadError::Timeout(_) => ErrorKind::Timeout,
            _ => ErrorKind::Dispatch,
        };
        AppError::with_source(kind, err.to_string(), err)
    }
}
