//! # pitchforge-core
//!
//! Core crate for PitchForge. Contains the queue store and blob store traits,
//! configuration schemas, pagination types, and the unified error system.
//!
//! This crate has **no** internal dependencies on other PitchForge crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
