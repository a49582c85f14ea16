//! Ingestion requests, the payload of ingestion jobs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::extraction::ExtractionKind;

/// Payload of an ingestion job: which upload to process and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionRequest {
    /// Run driven by this job.
    pub run_id: Uuid,
    /// Owning project, if any.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Key of the uploaded script in the blob store.
    pub blob_key: String,
    /// MIME type reported by the upload.
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Explicit extraction kind; derived from `mime_type` when absent.
    #[serde(default)]
    pub kind: Option<ExtractionKind>,
    /// Target market region (e.g. `"Mumbai"`).
    #[serde(default)]
    pub region: Option<String>,
    /// Target distribution platforms.
    #[serde(default)]
    pub platforms: Vec<String>,
}

impl IngestionRequest {
    /// Extraction kind to use for the upload.
    pub fn extraction_kind(&self) -> ExtractionKind {
        self.kind
            .unwrap_or_else(|| ExtractionKind::for_mime(self.mime_type.as_deref()))
    }
}
