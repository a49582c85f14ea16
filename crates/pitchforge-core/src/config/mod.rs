//! Application configuration schemas.
//!
//! All configuration structs are deserialized via the `config` crate from
//! TOML files and `PITCHFORGE__`-prefixed environment variables. Every field
//! carries a default so that an empty configuration is valid.

pub mod app;
pub mod auth;
pub mod logging;
pub mod offload;
pub mod pipeline;
pub mod queue;
pub mod scheduler;
pub mod store;

use serde::{Deserialize, Serialize};

use self::app::ServerConfig;
use self::auth::AuthConfig;
use self::logging::LoggingConfig;
use self::offload::OffloadConfig;
use self::pipeline::PipelineConfig;
use self::queue::QueueConfig;
use self::scheduler::SchedulerConfig;
use self::store::{BlobConfig, StoreConfig};

use crate::error::AppError;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Queue store settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Blob store settings.
    #[serde(default)]
    pub blobs: BlobConfig,
    /// Job queue retry and batch settings.
    #[serde(default)]
    pub queue: QueueConfig,
    /// Worker offload settings.
    #[serde(default)]
    pub offload: OffloadConfig,
    /// Pipeline orchestration settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Interval scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Scheduler and admin credentials.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges `config/default` with an environment-specific overlay and
    /// environment variables prefixed with `PITCHFORGE__`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("PITCHFORGE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a single file, without overlays.
    pub fn from_file(path: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;
        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check settings that constrain each other.
    ///
    /// A batch pass may claim jobs until the claim window closes and the
    /// last claimed job may run for the longest offload timeout. The process
    /// lock has to outlive both, or a second pass could start while the
    /// first one is still running.
    pub fn validate(&self) -> Result<(), AppError> {
        let job_budget = self
            .offload
            .text_timeout_seconds
            .max(self.offload.ocr_timeout_seconds);
        let worst_case = self.queue.claim_window_seconds.saturating_add(job_budget);
        if worst_case >= self.queue.process_lock_ttl_seconds {
            return Err(AppError::configuration(format!(
                "queue.process_lock_ttl_seconds ({}) must exceed queue.claim_window_seconds ({}) \
                 plus the longest offload timeout ({job_budget})",
                self.queue.process_lock_ttl_seconds, self.queue.claim_window_seconds,
            )));
        }
        Ok(())
    }
}
