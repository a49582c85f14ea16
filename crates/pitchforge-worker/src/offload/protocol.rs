//! Messages exchanged with the `pitchforge-extract` execution unit.
//!
//! The manager writes one [`ExtractionTask`] as JSON to the unit's stdin and
//! closes it. The unit answers on stdout with newline-delimited
//! [`WorkerMessage`]s and exits after `done` or `error`.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use pitchforge_entity::{ExtractionKind, ExtractionResult};

/// Work sent to an execution unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionTask {
    /// Extraction kind.
    pub kind: ExtractionKind,
    /// OCR command line, used for [`ExtractionKind::Ocr`].
    #[serde(default)]
    pub ocr_command: Vec<String>,
    /// Input bytes, base64-encoded.
    pub data: String,
}

impl ExtractionTask {
    /// Build a task over raw input bytes.
    pub fn new(kind: ExtractionKind, ocr_command: Vec<String>, data: &[u8]) -> Self {
        Self {
            kind,
            ocr_command,
            data: STANDARD.encode(data),
        }
    }

    /// Decode the input bytes.
    pub fn decode_data(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.data)
    }
}

/// One line of unit output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerMessage {
    /// Progress percentage after a completed stage.
    Progress {
        /// Percentage, 0 to 100.
        percent: u8,
    },
    /// Successful result; last message.
    Done {
        /// Extraction output.
        result: ExtractionResult,
    },
    /// Failure; last message.
    Error {
        /// Error kind code (e.g. `validation_error`).
        code: String,
        /// Failure description.
        message: String,
    },
}

impl WorkerMessage {
    /// Encode as one line of NDJSON, without the trailing newline.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
