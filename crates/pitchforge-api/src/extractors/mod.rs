//! Custom Axum extractors.

pub mod auth;
pub mod pagination;

pub use auth::{AdminAuth, SchedulerAuth};
pub use pagination::DeadLetterQuery;
