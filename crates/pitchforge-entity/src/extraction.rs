//! Extraction kinds and results shared by both execution paths.

use serde::{Deserialize, Serialize};

/// Kind of CPU-heavy parsing work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionKind {
    /// Text extraction from a text-bearing document.
    Text,
    /// Optical character recognition of an image.
    Ocr,
}

impl ExtractionKind {
    /// Pick the extraction kind for a MIME type.
    pub fn for_mime(mime_type: Option<&str>) -> Self {
        match mime_type {
            Some(mime) if mime.starts_with("image/") => Self::Ocr,
            _ => Self::Text,
        }
    }

    /// Return the kind as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Ocr => "ocr",
        }
    }
}

/// Structured output of an extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    /// Normalized text.
    pub text: String,
    /// Number of pages (form-feed separated).
    pub page_count: usize,
    /// Scene headings in order of appearance.
    pub scenes: Vec<String>,
    /// Distinct speaking characters in order of first appearance.
    pub characters: Vec<String>,
    /// Whitespace-separated word count.
    pub word_count: usize,
    /// Character count of the normalized text.
    pub char_count: usize,
}
