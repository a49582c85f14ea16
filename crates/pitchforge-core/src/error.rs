//! Unified application error types for PitchForge.
//!
//! All crates map their internal errors into [`AppError`] for consistent
//! propagation through the ? operator. The job-processing taxonomy
//! (`storage_error`, `dispatch_error`, `timeout_error`, `step_error`,
//! `exhausted_error`) lives here so that the queue, the offload manager and
//! the orchestrator classify failures the same way.

use std::fmt;
use thiserror::Error;

/// Top-level error kind categorization used across the entire application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The queue store is unreachable or returned inconsistent data.
    Storage,
    /// A background execution unit could not be created or talked to.
    Dispatch,
    /// Work exceeded its allotted execution window.
    Timeout,
    /// A pipeline step's own logic failed.
    Step,
    /// A job was retried up to the maximum attempt count.
    Exhausted,
    /// The requested resource was not found.
    NotFound,
    /// The caller did not present valid credentials.
    Unauthorized,
    /// The caller is not allowed to perform the action.
    Forbidden,
    /// Input validation failed.
    Validation,
    /// A conflict occurred (duplicate entry, concurrent modification, etc.).
    Conflict,
    /// A serialization/deserialization error occurred.
    Serialization,
    /// A configuration error occurred.
    Configuration,
    /// An internal error occurred.
    Internal,
    /// The service is temporarily unavailable.
    ServiceUnavailable,
}

impl ErrorKind {
    /// Snake-case code used in logs, metrics and batch summaries.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Storage => "storage_error",
            Self::Dispatch => "dispatch_error",
            Self::Timeout => "timeout_error",
            Self::Step => "step_error",
            Self::Exhausted => "exhausted_error",
            Self::NotFound => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::Validation => "validation_error",
            Self::Conflict => "conflict",
            Self::Serialization => "serialization_error",
            Self::Configuration => "configuration_error",
            Self::Internal => "internal_error",
            Self::ServiceUnavailable => "service_unavailable",
        }
    }

    /// Every kind, in declaration order.
    pub const ALL: [ErrorKind; 14] = [
        Self::Storage,
        Self::Dispatch,
        Self::Timeout,
        Self::Step,
        Self::Exhausted,
        Self::NotFound,
        Self::Unauthorized,
        Self::Forbidden,
        Self::Validation,
        Self::Conflict,
        Self::Serialization,
        Self::Configuration,
        Self::Internal,
        Self::ServiceUnavailable,
    ];

    /// Parse a code produced by [`ErrorKind::code`].
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// The unified application error used throughout PitchForge.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new application error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create a new application error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Storage, message)
    }

    /// Create a dispatch error.
    pub fn dispatch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Dispatch, message)
    }

    /// Create a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Create a step error.
    pub fn step(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Step, message)
    }

    /// Create an exhausted error.
    pub fn exhausted(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Exhausted, message)
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Create an unauthorized error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    /// Create a forbidden error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Create a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Create a service-unavailable error.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServiceUnavailable, message)
    }

    /// Whether a job that failed with this error should be scheduled for retry.
    ///
    /// Dispatch errors never reach the queue: the offload manager falls back
    /// to synchronous execution instead.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Storage | ErrorKind::Timeout | ErrorKind::Step
        )
    }
}

impl Clone for AppError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            source: None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(
            ErrorKind::Serialization,
            format!("JSON serialization error: {err}"),
            err,
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorKind::Internal, format!("I/O error: {err}"), err)
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}
