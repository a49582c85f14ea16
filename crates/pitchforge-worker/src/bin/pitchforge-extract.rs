//! Background execution unit for script extraction.
//!
//! Reads one JSON `ExtractionTask` from stdin, runs the extraction engine and
//! writes newline-delimited `WorkerMessage`s to stdout. Logs go to stderr.

use std::io::Write;
use std::process::ExitCode;

use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

use pitchforge_core::error::AppError;
use pitchforge_worker::offload::{ExtractionEngine, ExtractionTask, WorkerMessage};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let message = match run().await {
        Ok(message) => message,
        Err(error) => WorkerMessage::Error {
            code: error.kind.code().to_string(),
            message: error.message,
        },
    };
    let failed = matches!(message, WorkerMessage::Error { .. });

    if let Err(e) = emit(&message) {
        tracing::error!(error = %e, "Failed to write final message");
        return ExitCode::FAILURE;
    }
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

async fn run() -> Result<WorkerMessage, AppError> {
    let mut input = Vec::new();
    tokio::io::stdin().read_to_end(&mut input).await?;

    let task: ExtractionTask = serde_json::from_slice(&input)?;
    let data = task
        .decode_data()
        .map_err(|e| AppError::validation(format!("Task data is not valid base64: {e}")))?;

    tracing::debug!(kind = task.kind.as_str(), bytes = data.len(), "Extraction task received");

    let engine = ExtractionEngine::new(task.ocr_command.clone());
    let mut report = |percent: u8| {
        if let Err(e) = emit(&WorkerMessage::Progress { percent }) {
            tracing::warn!(error = %e, "Failed to report progress");
        }
    };
    let result = engine.extract(task.kind, &data, &mut report).await?;

    Ok(WorkerMessage::Done { result })
}

/// Write one message line to stdout and flush it.
fn emit(message: &WorkerMessage) -> std::io::Result<()> {
    let line = message.to_line().map_err(std::io::Error::other)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{line}")?;
    stdout.flush()
}
