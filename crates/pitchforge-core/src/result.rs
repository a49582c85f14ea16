//! Convenience result type alias for PitchForge.

use crate::error::AppError;

/// A specialized `Result` type for PitchForge operations.
pub type AppResult<T> = Result<T, AppError>;
