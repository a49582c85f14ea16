//! Credentials guarding the trigger and administrative endpoints.

use serde::{Deserialize, Serialize};

/// Shared secrets for machine callers.
///
/// The scheduler secret and the admin key are distinct credentials. An empty
/// value disables the corresponding endpoints instead of leaving them open.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Secret sent by the interval scheduler in `x-scheduler-secret`.
    #[serde(default)]
    pub scheduler_secret: String,
    /// Key sent by operators in `x-admin-key`.
    #[serde(default)]
    pub admin_key: String,
}
