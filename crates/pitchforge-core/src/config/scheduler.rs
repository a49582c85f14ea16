//! Interval scheduler configuration.

use serde::{Deserialize, Serialize};

/// In-process interval scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Whether the in-process scheduler runs. External schedulers can use
    /// the HTTP trigger instead.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Cron expression (with seconds) for batch processing.
    #[serde(default = "default_process_cron")]
    pub process_cron: String,
    /// Cron expression (with seconds) for the dead-letter cleanup sweep.
    #[serde(default = "default_cleanup_cron")]
    pub cleanup_cron: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            process_cron: default_process_cron(),
            cleanup_cron: default_cleanup_cron(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_process_cron() -> String {
    "*/30 * * * * *".to_string()
}

fn default_cleanup_cron() -> String {
    "0 0 3 * * *".to_string()
}
