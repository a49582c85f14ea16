//! Blob store trait for uploaded source material.

use async_trait::async_trait;
use bytes::Bytes;

use crate::result::AppResult;

/// Trait for the store holding uploaded scripts and other job artifacts.
///
/// Job payloads reference blobs by key; the queue never stores the bytes
/// themselves.
#[async_trait]
pub trait BlobStore: Send + Sync + std::fmt::Debug + 'static {
    /// Return the provider type name (e.g., "local").
    fn provider_type(&self) -> &str;

    /// Read a blob into memory.
    async fn read(&self, key: &str) -> AppResult<Bytes>;

    /// Write a blob.
    async fn write(&self, key: &str, data: Bytes) -> AppResult<()>;

    /// Delete a blob. Deleting an absent blob is not an error.
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Check whether a blob exists.
    async fn exists(&self, key: &str) -> AppResult<bool>;
}
