//! Blob storage for uploaded scripts.

pub mod local;

pub use local::LocalBlobStore;
