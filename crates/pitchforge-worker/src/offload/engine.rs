//! Script extraction engine.
//!
//! The same staged extraction runs inside the `pitchforge-extract` unit and
//! in-process on the synchronous path, so both report the same progress
//! sequence and produce the same result for the same bytes.

use std::process::Stdio;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use pitchforge_core::error::{AppError, ErrorKind};
use pitchforge_entity::{ExtractionKind, ExtractionResult};

/// Progress after decoding the input bytes.
pub const PROGRESS_DECODED: u8 = 10;
/// Progress after optical character recognition (a no-op for text).
pub const PROGRESS_RECOGNIZED: u8 = 40;
/// Progress after whitespace and control character normalization.
pub const PROGRESS_NORMALIZED: u8 = 60;
/// Progress after splitting into pages and scenes.
pub const PROGRESS_SEGMENTED: u8 = 80;
/// Progress once the result is assembled.
pub const PROGRESS_DONE: u8 = 100;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const UTF16_LE_BOM: &[u8] = &[0xFF, 0xFE];
const UTF16_BE_BOM: &[u8] = &[0xFE, 0xFF];

/// Longest line still considered a dialogue cue.
const MAX_CUE_LEN: usize = 40;

/// Errors raised by extraction stages.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Nothing to extract.
    #[error("Input is empty")]
    EmptyInput,

    /// OCR was requested without a command to run.
    #[error("No OCR command configured")]
    MissingOcrCommand,

    /// The OCR command ran but failed.
    #[error("OCR command failed: {0}")]
    Recognition(String),

    /// The OCR command could not be run.
    #[error("OCR command I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let kind = match &err {
            EngineError::EmptyInput => ErrorKind::Validation,
            EngineError::MissingOcrCommand => ErrorKind::Configuration,
            EngineError::Recognition(_) | EngineError::Io(_) => ErrorKind::Step,
        };
        AppError::with_source(kind, err.to_string(), err)
    }
}

/// Staged text extraction: decode, recognize, normalize, segment, analyze.
#[derive(Debug, Clone, Default)]
pub struct ExtractionEngine {
    ocr_command: Vec<String>,
}

impl ExtractionEngine {
    /// Create an engine using `ocr_command` for image input.
    pub fn new(ocr_command: Vec<String>) -> Self {
        Self { ocr_command }
    }

    /// The configured OCR command line.
    pub fn ocr_command(&self) -> &[String] {
        &self.ocr_command
    }

    /// Run every stage over `data`, reporting progress after each one.
    pub async fn extract(
        &self,
        kind: ExtractionKind,
        data: &[u8],
        progress: &mut (dyn FnMut(u8) + Send),
    ) -> Result<ExtractionResult, EngineError> {
        if data.is_empty() {
            return Err(EngineError::EmptyInput);
        }

        let decoded = match kind {
            ExtractionKind::Text => Some(decode_text(data)),
            ExtractionKind::Ocr => None,
        };
        progress(PROGRESS_DECODED);

        let raw = match decoded {
            Some(text) => text,
            None => self.recognize(data).await?,
        };
        progress(PROGRESS_RECOGNIZED);

        let text = normalize(&raw);
        progress(PROGRESS_NORMALIZED);

        let (page_count, scenes) = segment(&text);
        progress(PROGRESS_SEGMENTED);

        let result = analyze(text, page_count, scenes);
        progress(PROGRESS_DONE);
        Ok(result)
    }

    /// Pipe image bytes through the OCR command and decode its output.
    async fn recognize(&self, data: &[u8]) -> Result<String, EngineError> {
        let (program, args) = self
            .ocr_command
            .split_first()
            .ok_or(EngineError::MissingOcrCommand)?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Recognition("stdin unavailable".to_string()))?;
        let feed = async move {
            let written = stdin.write_all(data).await;
            drop(stdin);
            match written {
                // The command may exit before reading all input.
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
                other => other,
            }
        };

        let (written, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;
        written?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Recognition(format!(
                "{program} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(decode_text(&output.stdout))
    }
}

/// Decode bytes as text, honoring UTF-8 and UTF-16 byte order marks.
///
/// Invalid sequences become U+FFFD.
pub fn decode_text(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(UTF8_BOM) {
        return String::from_utf8_lossy(rest).into_owned();
    }
    if let Some(rest) = bytes.strip_prefix(UTF16_LE_BOM) {
        return decode_utf16(rest, u16::from_le_bytes);
    }
    if let Some(rest) = bytes.strip_prefix(UTF16_BE_BOM) {
        return decode_utf16(rest, u16::from_be_bytes);
    }
    String::from_utf8_lossy(bytes).into_owned()
}

fn decode_utf16(bytes: &[u8], read: fn([u8; 2]) -> u16) -> String {
    let units = bytes.chunks_exact(2).map(|pair| read([pair[0], pair[1]]));
    char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Unify line endings, drop control characters, trim trailing blanks and
/// collapse runs of more than two empty lines. Form feeds are kept.
pub fn normalize(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(unified.len());
    let mut blank_run = 0usize;

    for line in unified.split('\n') {
        let cleaned: String = line
            .chars()
            .filter(|c| !c.is_control() || *c == '\t' || *c == '\x0c')
            .collect();
        let cleaned = cleaned.trim_end_matches([' ', '\t']);

        if cleaned.is_empty() {
            blank_run += 1;
            if blank_run > 2 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(cleaned);
        out.push('\n');
    }

    out.trim_matches('\n').to_string()
}

/// Count form-feed separated pages and collect scene headings.
pub fn segment(text: &str) -> (usize, Vec<String>) {
    let page_count = if text.trim().is_empty() {
        0
    } else {
        text.split('\x0c')
            .filter(|page| !page.trim().is_empty())
            .count()
            .max(1)
    };

    let scenes = text
        .lines()
        .map(clean_line)
        .filter(|line| is_scene_heading(line))
        .map(str::to_string)
        .collect();

    (page_count, scenes)
}

/// Assemble the result: counts and the speaking characters in order of
/// first appearance.
pub fn analyze(text: String, page_count: usize, scenes: Vec<String>) -> ExtractionResult {
    let lines: Vec<&str> = text.lines().map(clean_line).collect();
    let mut characters: Vec<String> = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let followed_by_dialogue = lines.get(i + 1).is_some_and(|next| !next.is_empty());
        if !followed_by_dialogue || !is_dialogue_cue(line) {
            continue;
        }
        let name = cue_name(line);
        if !name.is_empty() && !characters.iter().any(|c| c == name) {
            characters.push(name.to_string());
        }
    }

    ExtractionResult {
        word_count: text.split_whitespace().count(),
        char_count: text.chars().count(),
        text,
        page_count,
        scenes,
        characters,
    }
}

fn clean_line(line: &str) -> &str {
    line.trim().trim_start_matches('\x0c').trim()
}

fn is_scene_heading(line: &str) -> bool {
    ["INT.", "EXT.", "INT/EXT", "EXT/INT", "I/E", "INT ", "EXT "]
        .iter()
        .any(|prefix| line.starts_with(prefix))
}

fn is_dialogue_cue(line: &str) -> bool {
    if line.is_empty() || line.chars().count() > MAX_CUE_LEN {
        return false;
    }
    if is_scene_heading(line) || line.ends_with(':') || line.starts_with("FADE") {
        return false;
    }
    let name = cue_name(line);
    name.chars().any(char::is_alphabetic)
        && name
            .chars()
            .all(|c| !c.is_alphabetic() || c.is_uppercase())
        && name.split_whitespace().count() <= 4
}

/// Strip parentheticals like `(V.O.)` and `(CONT'D)` from a cue.
fn cue_name(line: &str) -> &str {
    line.split('(').next().unwrap_or(line).trim()
}
