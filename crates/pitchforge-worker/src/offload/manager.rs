//! Worker offload manager.
//!
//! Capability state moves `Unknown -> Supported | Unsupported` on the first
//! probe and `Supported -> Unsupported` on the first dispatch failure. It
//! never moves back, so a broken runtime is not re-probed on every job.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pitchforge_core::config::offload::{OffloadConfig, RuntimeKind};
use pitchforge_core::error::AppError;
use pitchforge_core::result::AppResult;
use pitchforge_entity::{ExtractionKind, ExtractionResult};

use super::capability::{OffloadCapability, ProcessCapability, RestrictedCapability};
use super::engine::ExtractionEngine;
use super::error::OffloadError;
use super::protocol::ExtractionTask;

const STATE_UNKNOWN: u8 = 0;
const STATE_SUPPORTED: u8 = 1;
const STATE_UNSUPPORTED: u8 = 2;

/// Weight of the newest sample in the rolling average duration.
const AVERAGE_WEIGHT: f64 = 0.2;

/// Memoized answer to "can work be offloaded?".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityState {
    /// Not probed yet.
    Unknown,
    /// Jobs are dispatched to execution units.
    Supported,
    /// Jobs run synchronously for the rest of the process lifetime.
    Unsupported,
}

impl CapabilityState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            STATE_SUPPORTED => Self::Supported,
            STATE_UNSUPPORTED => Self::Unsupported,
            _ => Self::Unknown,
        }
    }
}

/// Point-in-time offload telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OffloadStats {
    /// Runtime name of the capability.
    pub runtime: String,
    /// Current capability state.
    pub state: CapabilityState,
    /// Whether `shutdown` was called.
    pub closed: bool,
    /// Jobs submitted.
    pub total_jobs: u64,
    /// Jobs served by an execution unit.
    pub offloaded_jobs: u64,
    /// Jobs served in-process.
    pub synchronous_jobs: u64,
    /// Jobs that ended in an error.
    pub failed_jobs: u64,
    /// Dispatch failures that triggered the synchronous fallback.
    pub fallbacks: u64,
    /// Rolling average duration of successful jobs.
    pub average_duration_ms: Option<f64>,
    /// Last successful job.
    pub last_success_at: Option<DateTime<Utc>>,
    /// Last failed job.
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Error of the last failed job or dispatch.
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct Timing {
    average_ms: Option<f64>,
    last_success_at: Option<DateTime<Utc>>,
    last_failure_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

#[derive(Debug, Default)]
struct Telemetry {
    total: AtomicU64,
    offloaded: AtomicU64,
    synchronous: AtomicU64,
    failed: AtomicU64,
    fallbacks: AtomicU64,
    timing: Mutex<Timing>,
}

impl Telemetry {
    fn record_success(&self, offloaded: bool, elapsed: Duration) {
        let counter = if offloaded {
            &self.offloaded
        } else {
            &self.synchronous
        };
        counter.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut timing) = self.timing.lock() {
            let sample = elapsed.as_secs_f64() * 1000.0;
            timing.average_ms = Some(match timing.average_ms {
                Some(avg) => avg + AVERAGE_WEIGHT * (sample - avg),
                None => sample,
            });
            timing.last_success_at = Some(Utc::now());
        }
    }

    fn record_failure(&self, error: &AppError) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.note_error(error.to_string());
    }

    fn record_fallback(&self, error: &OffloadError) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
        self.note_error(error.to_string());
    }

    fn note_error(&self, message: String) {
        if let Ok(mut timing) = self.timing.lock() {
            timing.last_failure_at = Some(Utc::now());
            timing.last_error = Some(message);
        }
    }
}

/// Runs extraction jobs in execution units when the runtime allows it, and
/// in-process otherwise.
///
/// Callers see the same result type and the same progress contract on both
/// paths: percentages are reported in increasing order and end at 100.
#[derive(Debug)]
pub struct OffloadManager {
    capability: Arc<dyn OffloadCapability>,
    engine: ExtractionEngine,
    text_timeout: Duration,
    ocr_timeout: Duration,
    state: AtomicU8,
    closed: AtomicBool,
    telemetry: Telemetry,
}

impl OffloadManager {
    /// Create a manager for the configured runtime.
    pub fn new(config: &OffloadConfig) -> Self {
        let capability: Arc<dyn OffloadCapability> = match (config.enabled, config.runtime) {
            (true, RuntimeKind::Full) => Arc::new(ProcessCapability::new(
                config.worker_path.as_ref().map(PathBuf::from),
            )),
            _ => Arc::new(RestrictedCapability),
        };
        Self::with_capability(capability, config)
    }

    /// Create a manager around an explicit capability.
    pub fn with_capability(capability: Arc<dyn OffloadCapability>, config: &OffloadConfig) -> Self {
        Self {
            capability,
            engine: ExtractionEngine::new(config.ocr_command.clone()),
            text_timeout: config.text_timeout(),
            ocr_timeout: config.ocr_timeout(),
            state: AtomicU8::new(STATE_UNKNOWN),
            closed: AtomicBool::new(false),
            telemetry: Telemetry::default(),
        }
    }

    /// Current capability state.
    pub fn state(&self) -> CapabilityState {
        CapabilityState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Whether the next job would be offloaded. Probes on first use.
    pub fn can_offload(&self) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }

        match self.state.load(Ordering::Acquire) {
            STATE_SUPPORTED => true,
            STATE_UNSUPPORTED => false,
            _ => {
                let probed = match self.capability.probe() {
                    Ok(()) => STATE_SUPPORTED,
                    Err(e) => {
                        tracing::warn!(
                            runtime = self.capability.runtime(),
                            error = %e,
                            "Worker offload unavailable, running jobs synchronously"
                        );
                        STATE_UNSUPPORTED
                    }
                };
                // Two first callers may both probe; the first answer sticks.
                match self.state.compare_exchange(
                    STATE_UNKNOWN,
                    probed,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => probed == STATE_SUPPORTED,
                    Err(current) => current == STATE_SUPPORTED,
                }
            }
        }
    }

    fn mark_unsupported(&self, error: &OffloadError) {
        let previous = self.state.swap(STATE_UNSUPPORTED, Ordering::AcqRel);
        if previous != STATE_UNSUPPORTED {
            tracing::warn!(
                runtime = self.capability.runtime(),
                error = %error,
                "Worker dispatch failed, switching to synchronous execution"
            );
        }
    }

    fn timeout_for(&self, kind: ExtractionKind) -> Duration {
        match kind {
            ExtractionKind::Text => self.text_timeout,
            ExtractionKind::Ocr => self.ocr_timeout,
        }
    }

    /// Extract `data`, offloading when possible.
    ///
    /// A dispatch failure switches the manager to synchronous mode and
    /// reruns the job in-process. A timed-out unit is terminated and the job
    /// fails with a timeout error.
    pub async fn process_job(
        &self,
        data: &[u8],
        kind: ExtractionKind,
        progress: impl FnMut(u8) + Send,
    ) -> AppResult<ExtractionResult> {
        let started = Instant::now();
        self.telemetry.total.fetch_add(1, Ordering::Relaxed);
        let mut report = monotonic(progress);

        if self.can_offload() {
            let task = ExtractionTask::new(kind, self.engine.ocr_command().to_vec(), data);
            match self
                .capability
                .dispatch(&task, self.timeout_for(kind), &mut report)
                .await
            {
                Ok(result) => {
                    self.telemetry.record_success(true, started.elapsed());
                    return Ok(result);
                }
                Err(OffloadError::Worker(error)) => {
                    self.telemetry.record_failure(&error);
                    return Err(error);
                }
                Err(error @ OffloadError::Timeout(_)) => {
                    self.mark_unsupported(&error);
                    let error = AppError::from(error);
                    self.telemetry.record_failure(&error);
                    return Err(error);
                }
                Err(error) => {
                    self.mark_unsupported(&error);
                    self.telemetry.record_fallback(&error);
                }
            }
        }

        let outcome = self.run_in_process(kind, data, &mut report).await;
        match &outcome {
            Ok(_) => self.telemetry.record_success(false, started.elapsed()),
            Err(error) => self.telemetry.record_failure(error),
        }
        outcome
    }

    /// Extract `data` in-process, bypassing the capability.
    pub async fn process_sync(
        &self,
        data: &[u8],
        kind: ExtractionKind,
        progress: impl FnMut(u8) + Send,
    ) -> AppResult<ExtractionResult> {
        let started = Instant::now();
        self.telemetry.total.fetch_add(1, Ordering::Relaxed);
        let mut report = monotonic(progress);

        let outcome = self.run_in_process(kind, data, &mut report).await;
        match &outcome {
            Ok(_) => self.telemetry.record_success(false, started.elapsed()),
            Err(error) => self.telemetry.record_failure(error),
        }
        outcome
    }

    async fn run_in_process(
        &self,
        kind: ExtractionKind,
        data: &[u8],
        progress: &mut (dyn FnMut(u8) + Send),
    ) -> AppResult<ExtractionResult> {
        let limit = self.timeout_for(kind);
        match tokio::time::timeout(limit, self.engine.extract(kind, data, progress)).await {
            Ok(result) => result.map_err(AppError::from),
            Err(_) => Err(OffloadError::Timeout(limit).into()),
        }
    }

    /// Stop offloading new jobs. Later jobs run synchronously.
    pub fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!("Worker offload manager shut down");
        }
    }

    /// Telemetry snapshot.
    pub fn stats(&self) -> OffloadStats {
        let timing = self
            .telemetry
            .timing
            .lock()
            .map(|t| {
                (
                    t.average_ms,
                    t.last_success_at,
                    t.last_failure_at,
                    t.last_error.clone(),
                )
            })
            .unwrap_or_default();

        OffloadStats {
            runtime: self.capability.runtime().to_string(),
            state: self.state(),
            closed: self.closed.load(Ordering::Acquire),
            total_jobs: self.telemetry.total.load(Ordering::Relaxed),
            offloaded_jobs: self.telemetry.offloaded.load(Ordering::Relaxed),
            synchronous_jobs: self.telemetry.synchronous.load(Ordering::Relaxed),
            failed_jobs: self.telemetry.failed.load(Ordering::Relaxed),
            fallbacks: self.telemetry.fallbacks.load(Ordering::Relaxed),
            average_duration_ms: timing.0,
            last_success_at: timing.1,
            last_failure_at: timing.2,
            last_error: timing.3,
        }
    }
}

/// Forward only increasing percentages, so a fallback after partial
/// progress never reports a step backwards.
fn monotonic(mut progress: impl FnMut(u8) + Send) -> impl FnMut(u8) + Send {
    let mut last = 0u8;
    move |percent: u8| {
        if percent > last {
            last = percent;
            progress(percent);
        }
    }
}
