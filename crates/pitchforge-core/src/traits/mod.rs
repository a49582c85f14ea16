//! Core trait definitions for PitchForge's pluggable backends.

pub mod blob;
pub mod store;
