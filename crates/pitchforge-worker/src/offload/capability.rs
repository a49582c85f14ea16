//! Runtime capability detection and dispatch.
//!
//! This is the only place that knows how work leaves the process. The rest
//! of the crate sees a probe ("can I offload?") and a dispatch function.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

use pitchforge_core::error::{AppError, ErrorKind};
use pitchforge_entity::ExtractionResult;

use super::error::OffloadError;
use super::protocol::{ExtractionTask, WorkerMessage};

/// File name of the execution unit binary.
pub const WORKER_BINARY: &str = "pitchforge-extract";

/// A runtime's ability to run extraction outside the caller's task.
#[async_trait]
pub trait OffloadCapability: Send + Sync + std::fmt::Debug {
    /// Runtime name for telemetry.
    fn runtime(&self) -> &'static str;

    /// Detect whether offloading is possible. The manager memoizes the answer.
    fn probe(&self) -> Result<(), OffloadError>;

    /// Run `task` in a fresh execution unit, released on every outcome.
    async fn dispatch(
        &self,
        task: &ExtractionTask,
        timeout: Duration,
        progress: &mut (dyn FnMut(u8) + Send),
    ) -> Result<ExtractionResult, OffloadError>;
}

/// Full runtime: each job runs in a `pitchforge-extract` child process.
#[derive(Debug, Default)]
pub struct ProcessCapability {
    configured: Option<PathBuf>,
    resolved: OnceLock<PathBuf>,
}

impl ProcessCapability {
    /// Create a capability using `worker_path`, or the binary installed next
    /// to the current executable when `None`.
    pub fn new(worker_path: Option<PathBuf>) -> Self {
        Self {
            configured: worker_path,
            resolved: OnceLock::new(),
        }
    }

    /// Locate the execution unit binary.
    fn resolve(&self) -> Result<&Path, OffloadError> {
        if let Some(path) = self.resolved.get() {
            return Ok(path.as_path());
        }
        let found = self.locate()?;
        Ok(self.resolved.get_or_init(|| found).as_path())
    }

    fn locate(&self) -> Result<PathBuf, OffloadError> {
        if let Some(path) = &self.configured {
            return if path.is_file() {
                Ok(path.clone())
            } else {
                Err(OffloadError::Unavailable(format!(
                    "worker binary not found at {}",
                    path.display()
                )))
            };
        }

        let exe = std::env::current_exe()?;
        let file_name = format!("{WORKER_BINARY}{}", std::env::consts::EXE_SUFFIX);
        // Test binaries live one level below the build output in `deps/`.
        exe.ancestors()
            .skip(1)
            .take(2)
            .map(|dir| dir.join(&file_name))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| {
                OffloadError::Unavailable(format!(
                    "{file_name} not found next to {}",
                    exe.display()
                ))
            })
    }
}

#[async_trait]
impl OffloadCapability for ProcessCapability {
    fn runtime(&self) -> &'static str {
        "full"
    }

    fn probe(&self) -> Result<(), OffloadError> {
        self.resolve().map(|_| ())
    }

    async fn dispatch(
        &self,
        task: &ExtractionTask,
        timeout: Duration,
        progress: &mut (dyn FnMut(u8) + Send),
    ) -> Result<ExtractionResult, OffloadError> {
        let path = self.resolve()?;
        let payload = serde_json::to_vec(task)
            .map_err(|e| OffloadError::Channel(format!("cannot encode task: {e}")))?;

        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| OffloadError::Channel("worker stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| OffloadError::Channel("worker stdout unavailable".to_string()))?;

        let exchange = async move {
            stdin
                .write_all(&payload)
                .await
                .map_err(|e| OffloadError::Channel(format!("cannot send task: {e}")))?;
            drop(stdin);

            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines
                .next_line()
                .await
                .map_err(|e| OffloadError::Channel(format!("cannot read worker output: {e}")))?
            {
                if line.trim().is_empty() {
                    continue;
                }
                let message: WorkerMessage = serde_json::from_str(&line)
                    .map_err(|e| OffloadError::Channel(format!("malformed worker message: {e}")))?;
                match message {
                    WorkerMessage::Progress { percent } => progress(percent),
                    WorkerMessage::Done { result } => return Ok(result),
                    WorkerMessage::Error { code, message } => {
                        let kind = ErrorKind::from_code(&code).unwrap_or(ErrorKind::Step);
                        return Err(OffloadError::Worker(AppError::new(kind, message)));
                    }
                }
            }
            Err(OffloadError::Channel(
                "worker exited without a result".to_string(),
            ))
        };

        let outcome = match tokio::time::timeout(timeout, exchange).await {
            Ok(outcome) => outcome,
            Err(_) => Err(OffloadError::Timeout(timeout)),
        };

        // Release the unit whatever happened; it may already have exited.
        let _ = child.start_kill();
        let _ = child.wait().await;

        outcome
    }
}

/// Restricted (edge-like) runtime: child processes are not available.
#[derive(Debug, Default, Clone, Copy)]
pub struct RestrictedCapability;

#[async_trait]
impl OffloadCapability for RestrictedCapability {
    fn runtime(&self) -> &'static str {
        "restricted"
    }

    fn probe(&self) -> Result<(), OffloadError> {
        Err(OffloadError::Unavailable(
            "restricted runtime cannot start worker processes".to_string(),
        ))
    }

    async fn dispatch(
        &self,
        _task: &ExtractionTask,
        _timeout: Duration,
        _progress: &mut (dyn FnMut(u8) + Send),
    ) -> Result<ExtractionResult, OffloadError> {
        Err(OffloadError::Unavailable(
            "restricted runtime cannot start worker processes".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restricted_never_offloads() {
        assert!(RestrictedCapability.probe().is_err());
    }

    #[test]
    fn test_missing_configured_binary() {
        let capability = ProcessCapability::new(Some(PathBuf::from("/nonexistent/pitchforge-extract")));
        let err = capability.probe().unwrap_err();
        assert!(matches!(err, OffloadError::Unavailable(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_garbled_unit_output_is_a_channel_error() {
        // `cat` echoes the task back, which is not a worker message.
        let capability = ProcessCapability::new(Some(PathBuf::from("/bin/cat")));
        let task = ExtractionTask::new(pitchforge_entity::ExtractionKind::Text, Vec::new(), b"x");
        let err = capability
            .dispatch(&task, Duration::from_secs(5), &mut |_: u8| {})
            .await
            .unwrap_err();
        assert!(matches!(err, OffloadError::Channel(_)));
    }
}
