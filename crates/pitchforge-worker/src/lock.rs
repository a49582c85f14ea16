//! Distributed lock on the queue store.
//!
//! A lock is a `lock:{name}` entry written with `set_nx` and a TTL, so a
//! crashed holder's lock expires on its own.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use pitchforge_core::result::AppResult;
use pitchforge_core::traits::store::{QueueStore, get_json};
use pitchforge_entity::LockEntry;
use pitchforge_store::keys;

/// Lock serializing batch processing passes.
pub const PROCESS_LOCK: &str = "process";

/// Lock serializing cleanup sweeps.
pub const CLEANUP_LOCK: &str = "cleanup";

/// Named mutual-exclusion locks shared by every scheduler instance.
#[derive(Debug, Clone)]
pub struct DistributedLock {
    store: Arc<dyn QueueStore>,
    holder: String,
}

impl DistributedLock {
    /// Create a lock client identified by a fresh holder token.
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self {
            store,
            holder: Uuid::new_v4().to_string(),
        }
    }

    /// Token written into the entries this client acquires.
    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Try to acquire `name` for `ttl`. Returns whether it was acquired.
    pub async fn acquire(&self, name: &str, ttl: Duration) -> AppResult<bool> {
        let now = Utc::now();
        let entry = LockEntry {
            name: name.to_string(),
            holder: self.holder.clone(),
            acquired_at: now,
            expires_at: now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
        };
        let value = serde_json::to_string(&entry)?;

        let acquired = self.store.set_nx(&keys::lock(name), &value, ttl).await?;
        if acquired {
            tracing::debug!(lock = name, ttl_ms = ttl.as_millis() as u64, "Acquired lock");
        } else {
            tracing::debug!(lock = name, "Lock is held elsewhere");
        }
        Ok(acquired)
    }

    /// Delete the lock entry, whoever holds it. Releasing an absent lock is fine.
    pub async fn release(&self, name: &str) -> AppResult<()> {
        self.store.delete(&keys::lock(name)).await?;
        tracing::debug!(lock = name, "Released lock");
        Ok(())
    }

    /// The live entry for `name`, if any.
    pub async fn inspect(&self, name: &str) -> AppResult<Option<LockEntry>> {
        let entry: Option<LockEntry> = get_json(self.store.as_ref(), &keys::lock(name)).await?;
        let now = Utc::now();
        Ok(entry.filter(|e| e.is_live(now)))
    }

    /// Whether `name` is currently held.
    pub async fn is_locked(&self, name: &str) -> AppResult<bool> {
        Ok(self.inspect(name).await?.is_some())
    }
}
