//! Queue store trait: the single source of truth for queue state.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::result::AppResult;

/// Trait for queue store backends (Redis or in-memory).
///
/// The job queue, the distributed lock and the run repository only rely on
/// the primitives below. `take` and `set_nx` must be atomic with respect to
/// concurrent callers on every implementation. Backend failures are reported
/// as [`ErrorKind::Storage`](crate::error::ErrorKind::Storage).
#[async_trait]
pub trait QueueStore: Send + Sync + std::fmt::Debug + 'static {
    /// Get a value by key. Returns `None` if the key does not exist or has expired.
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Set a value, optionally expiring after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()>;

    /// Delete a key. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Atomically remove a key and return its value.
    ///
    /// Among concurrent callers for the same key, at most one receives `Some`.
    async fn take(&self, key: &str) -> AppResult<Option<String>>;

    /// Set a value only if the key is absent or expired.
    /// Returns `true` if the value was written.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool>;

    /// List all live entries whose key starts with `prefix`.
    async fn scan_prefix(&self, prefix: &str) -> AppResult<Vec<(String, String)>>;

    /// Atomically add `delta` to an integer counter. Returns the new value.
    async fn incr_by(&self, key: &str, delta: i64) -> AppResult<i64>;

    /// Check that the store backend is reachable.
    async fn health_check(&self) -> AppResult<bool>;
}

/// Get a typed value by deserializing from JSON.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn QueueStore,
    key: &str,
) -> AppResult<Option<T>> {
    match store.get(key).await? {
        Some(value) => Ok(Some(serde_json::from_str(&value)?)),
        None => Ok(None),
    }
}

/// Set a typed value by serializing to JSON.
pub async fn set_json<T: Serialize + Sync + ?Sized>(
    store: &dyn QueueStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> AppResult<()> {
    let json = serde_json::to_string(value)?;
    store.set(key, &json, ttl).await
}
