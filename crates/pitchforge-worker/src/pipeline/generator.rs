//! Step content generation.
//!
//! Every step after `preprocess` produces structured content from what the
//! earlier steps already know. [`ContentGenerator`] is the seam where a
//! language-model provider plugs in; [`DeterministicGenerator`] derives the
//! same shapes without one and also supplies the substitute outputs used
//! when a step fails.

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use pitchforge_core::error::AppError;
use pitchforge_core::result::AppResult;
use pitchforge_entity::{ExtractionResult, IngestionRequest, StepName};

/// Words kept in a generated synopsis.
const SYNOPSIS_WORDS: usize = 60;

/// Scene headings turned into mood-board prompts.
const MOOD_BOARD_SCENES: usize = 6;

/// Keywords mapped to the theme they suggest.
const THEME_KEYWORDS: &[(&str, &str)] = &[
    ("love", "romance"),
    ("heart", "romance"),
    ("family", "family"),
    ("mother", "family"),
    ("father", "family"),
    ("money", "ambition"),
    ("ledger", "ambition"),
    ("power", "ambition"),
    ("gun", "crime"),
    ("police", "crime"),
    ("village", "roots"),
    ("city", "migration"),
];

/// What a step can see: the ingestion request and the outputs of the steps
/// before it.
#[derive(Debug, Clone)]
pub struct StepContext {
    /// The ingestion being processed.
    pub request: IngestionRequest,
    /// Outputs keyed by step name.
    pub outputs: Map<String, Value>,
}

impl StepContext {
    /// Create a context.
    pub fn new(request: IngestionRequest, outputs: Map<String, Value>) -> Self {
        Self { request, outputs }
    }

    /// Output of an earlier step.
    pub fn output(&self, step: StepName) -> Option<&Value> {
        self.outputs.get(step.as_str())
    }

    /// The extraction produced by `preprocess`, if it produced one.
    pub fn extraction(&self) -> Option<ExtractionResult> {
        self.output(StepName::Preprocess)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    fn text_field(&self, step: StepName, field: &str) -> Option<String> {
        self.output(step)
            .and_then(|v| v.get(field))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

/// Produces the output of a pipeline step.
#[async_trait]
pub trait ContentGenerator: Send + Sync + std::fmt::Debug {
    /// Generate the output of `step`.
    async fn generate(&self, step: StepName, context: &StepContext) -> AppResult<Value>;

    /// Deterministic stand-in used when `step` failed.
    fn substitute(&self, step: StepName, context: &StepContext) -> Value;
}

/// Generator deriving every output from the extracted script.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeterministicGenerator;

impl DeterministicGenerator {
    fn core_extraction(context: &StepContext, extraction: &ExtractionResult) -> Value {
        let lead = extraction
            .characters
            .first()
            .map(String::as_str)
            .unwrap_or("An unnamed lead");
        let setting = extraction
            .scenes
            .first()
            .map(|s| format!(" beginning at {s}"))
            .unwrap_or_default();
        let region = context
            .request
            .region
            .as_deref()
            .map(|r| format!(" for audiences in {r}"))
            .unwrap_or_default();

        let synopsis = extraction
            .text
            .split_whitespace()
            .take(SYNOPSIS_WORDS)
            .collect::<Vec<_>>()
            .join(" ");

        let lowered = extraction.text.to_lowercase();
        let mut themes: Vec<&str> = Vec::new();
        for (keyword, theme) in THEME_KEYWORDS {
            if lowered.contains(keyword) && !themes.contains(theme) {
                themes.push(*theme);
            }
        }

        json!({
            "logline": format!(
                "{lead} drives a story told across {} scenes{setting}{region}.",
                extraction.scenes.len()
            ),
            "synopsis": synopsis,
            "themes": themes,
        })
    }

    fn character_bible(extraction: &ExtractionResult) -> Value {
        let characters: Vec<Value> = extraction
            .characters
            .iter()
            .enumerate()
            .map(|(i, name)| {
                json!({
                    "name": name,
                    "role": if i == 0 { "lead" } else { "supporting" },
                    "order": i + 1,
                })
            })
            .collect();
        json!({ "characters": characters })
    }

    fn market_adaptation(context: &StepContext, extraction: &ExtractionResult) -> Value {
        let format = if extraction.scenes.len() > 60 {
            "series"
        } else {
            "feature"
        };
        let recommendations: Vec<Value> = context
            .request
            .platforms
            .iter()
            .map(|platform| {
                json!({
                    "platform": platform,
                    "format": format,
                    "language": context.request.region.as_deref().unwrap_or("any"),
                })
            })
            .collect();
        json!({
            "region": context.request.region,
            "platforms": context.request.platforms,
            "recommendations": recommendations,
        })
    }

    fn package_assembly(extraction: &ExtractionResult) -> Value {
        let tier = match extraction.scenes.len() {
            0..=30 => "low",
            31..=80 => "medium",
            _ => "high",
        };
        json!({
            "deck_outline": [
                "Logline",
                "Synopsis",
                "Characters",
                "Market Fit",
                "Visual Direction",
                "Budget",
            ],
            "budget": {
                "tier": tier,
                "scenes": extraction.scenes.len(),
                "pages": extraction.page_count,
            },
        })
    }

    fn visuals(context: &StepContext, extraction: &ExtractionResult) -> Value {
        let direction = context
            .text_field(StepName::CoreExtraction, "logline")
            .unwrap_or_else(|| "Untitled script".to_string());
        let mood_board: Vec<String> = extraction
            .scenes
            .iter()
            .take(MOOD_BOARD_SCENES)
            .map(|scene| art_direction(scene))
            .collect();
        json!({
            "mood_board": mood_board,
            "art_direction_notes": art_direction(&direction),
            "reference_images": [],
        })
    }

    fn final_package(context: &StepContext) -> Value {
        let characters = context
            .output(StepName::CharacterBible)
            .and_then(|v| v.get("characters"))
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0);
        json!({
            "document_url": null,
            "deck_url": null,
            "summary": {
                "runId": context.request.run_id,
                "logline": context.text_field(StepName::CoreExtraction, "logline"),
                "characters": characters,
                "deckOutline": context
                    .output(StepName::PackageAssembly)
                    .and_then(|v| v.get("deck_outline"))
                    .cloned()
                    .unwrap_or(Value::Array(Vec::new())),
            },
        })
    }
}

#[async_trait]
impl ContentGenerator for DeterministicGenerator {
    async fn generate(&self, step: StepName, context: &StepContext) -> AppResult<Value> {
        let extraction = context.extraction().unwrap_or_default();
        let output = match step {
            StepName::Preprocess => {
                return Err(AppError::internal(
                    "preprocess output comes from extraction, not generation",
                ));
            }
            StepName::CoreExtraction => Self::core_extraction(context, &extraction),
            StepName::CharacterBible => Self::character_bible(&extraction),
            StepName::MarketAdaptation => Self::market_adaptation(context, &extraction),
            StepName::PackageAssembly => Self::package_assembly(&extraction),
            StepName::Visuals => Self::visuals(context, &extraction),
            StepName::FinalPackage => Self::final_package(context),
        };
        Ok(output)
    }

    fn substitute(&self, step: StepName, context: &StepContext) -> Value {
        match step {
            StepName::Preprocess => {
                serde_json::to_value(ExtractionResult::default()).unwrap_or(Value::Null)
            }
            StepName::CoreExtraction => json!({ "logline": "", "synopsis": "", "themes": [] }),
            StepName::CharacterBible => json!({ "characters": [] }),
            StepName::MarketAdaptation => json!({
                "region": context.request.region,
                "platforms": context.request.platforms,
                "recommendations": [],
            }),
            StepName::PackageAssembly => json!({ "deck_outline": [], "budget": {} }),
            StepName::Visuals => json!({
                "mood_board": [],
                "art_direction_notes": "",
                "reference_images": [],
            }),
            StepName::FinalPackage => json!({
                "document_url": null,
                "deck_url": null,
                "summary": {},
            }),
        }
    }
}

/// Prompt for a visual reference, with regional styling cues.
fn art_direction(subject: &str) -> String {
    format!("{subject}, Indian style, Bollywood visuals, vibrant colors")
}
