//! Route handlers organized by domain.

pub mod admin;
pub mod health;
pub mod ingestion;
pub mod jobs;
pub mod queue;
