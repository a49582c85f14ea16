//! # pitchforge-store
//!
//! Queue store and blob store implementations for PitchForge. The queue
//! store backend is selected at runtime:
//!
//! - **memory**: in-process store on [dashmap](https://crates.io/crates/dashmap)
//!   with per-entry expiry, for single-node deployments and tests
//! - **redis**: shared store using the [redis](https://crates.io/crates/redis) crate
//!
//! Uploaded scripts live in the local [`blob::LocalBlobStore`].

pub mod blob;
pub mod keys;
#[cfg(feature = "memory")]
pub mod memory;
pub mod provider;
#[cfg(feature = "redis-backend")]
pub mod redis;

pub use blob::LocalBlobStore;
pub use provider::StoreManager;
