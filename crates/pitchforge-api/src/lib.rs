//! # pitchforge-api
//!
//! HTTP API layer for PitchForge built on Axum.
//!
//! Exposes the batch trigger, ingestion submission and status, dead-letter
//! administration, queue inspection and health endpoints, together with the
//! credential extractors guarding them and the error-to-HTTP mapping.

pub mod app;
pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use app::build_app;
pub use state::AppState;
