//! Queue store manager that dispatches to the configured backend.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use pitchforge_core::config::store::StoreConfig;
use pitchforge_core::error::AppError;
use pitchforge_core::result::AppResult;
use pitchforge_core::traits::store::QueueStore;

/// Queue store manager wrapping the configured backend.
#[derive(Debug, Clone)]
pub struct StoreManager {
    inner: Arc<dyn QueueStore>,
    provider: &'static str,
}

impl StoreManager {
    /// Create a store manager from configuration.
    pub async fn new(config: &StoreConfig) -> AppResult<Self> {
        let (inner, provider): (Arc<dyn QueueStore>, &'static str) =
            match config.provider.as_str() {
                #[cfg(feature = "redis-backend")]
                "redis" => {
                    info!("Initializing Redis queue store");
                    let client = crate::redis::RedisClient::connect(&config.redis).await?;
                    (Arc::new(crate::redis::RedisQueueStore::new(client)), "redis")
                }
                #[cfg(feature = "memory")]
                "memory" => {
                    info!("Initializing in-memory queue store");
                    (Arc::new(crate::memory::MemoryQueueStore::new()), "memory")
                }
                other => {
                    return Err(AppError::configuration(format!(
                        "Unknown store provider: '{other}'. Supported: memory, redis"
                    )));
                }
            };

        Ok(Self { inner, provider })
    }

    /// Wrap an existing store (for testing).
    pub fn from_store(store: Arc<dyn QueueStore>) -> Self {
        Self {
            inner: store,
            provider: "custom",
        }
    }

    /// Name of the active backend.
    pub fn provider_name(&self) -> &'static str {
        self.provider
    }

    /// The shared store handle.
    pub fn store(&self) -> Arc<dyn QueueStore> {
        Arc::clone(&self.inner)
    }
}

#[async_trait]
impl QueueStore for StoreManager {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()> {
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.inner.delete(key).await
    }

    async fn take(&self, key: &str) -> AppResult<Option<String>> {
        self.inner.take(key).await
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool> {
        self.inner.set_nx(key, value, ttl).await
    }

    async fn scan_prefix(&self, prefix: &str) -> AppResult<Vec<(String, String)>> {
        self.inner.scan_prefix(prefix).await
    }

    async fn incr_by(&self, key: &str, delta: i64) -> AppResult<i64> {
        self.inner.incr_by(key, delta).await
    }

    async fn health_check(&self) -> AppResult<bool> {
        self.inner.health_check().await
    }
}
