//! Worker offload configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Execution environment the process runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    /// Full runtime: child processes may be spawned.
    #[default]
    Full,
    /// Restricted (edge-like) runtime: offloading is impossible.
    Restricted,
}

/// Worker offload configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffloadConfig {
    /// Whether offloading is attempted at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Runtime the process is deployed into.
    #[serde(default)]
    pub runtime: RuntimeKind,
    /// Explicit path of the extraction worker executable.
    #[serde(default)]
    pub worker_path: Option<String>,
    /// Timeout for text extraction jobs in seconds.
    #[serde(default = "default_text_timeout")]
    pub text_timeout_seconds: u64,
    /// Timeout for OCR jobs in seconds.
    #[serde(default = "default_ocr_timeout")]
    pub ocr_timeout_seconds: u64,
    /// External OCR command, fed image bytes on stdin, text on stdout.
    #[serde(default = "default_ocr_command")]
    pub ocr_command: Vec<String>,
}

impl OffloadConfig {
    /// Timeout for text extraction.
    pub fn text_timeout(&self) -> Duration {
        Duration::from_secs(self.text_timeout_seconds)
    }

    /// Timeout for OCR.
    pub fn ocr_timeout(&self) -> Duration {
        Duration::from_secs(self.ocr_timeout_seconds)
    }
}

impl Default for OffloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            runtime: RuntimeKind::default(),
            worker_path: None,
            text_timeout_seconds: default_text_timeout(),
            ocr_timeout_seconds: default_ocr_timeout(),
            ocr_command: default_ocr_command(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_text_timeout() -> u64 {
    90
}

fn default_ocr_timeout() -> u64 {
    180
}

fn default_ocr_command() -> Vec<String> {
    vec![
        "tesseract".to_string(),
        "stdin".to_string(),
        "stdout".to_string(),
    ]
}
