//! Distributed lock entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named lock with an expiry timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockEntry {
    /// Lock name.
    pub name: String,
    /// Token identifying the acquirer.
    pub holder: String,
    /// When the lock was acquired.
    pub acquired_at: DateTime<Utc>,
    /// When the lock stops being valid, released or not.
    pub expires_at: DateTime<Utc>,
}

impl LockEntry {
    /// Whether the lock is still valid at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}
