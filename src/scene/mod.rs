//! Scene descriptors: the unit of work for a run.
//!
//! Scenes arrive as a JSON array of objects. Each object may carry its own
//! `scene` id (integer or string); scenes without one are numbered by position.
//!
//! ```
//! use sceneloom::scene::parse;
//!
//! let scenes = parse(r#"[{"scene": 1, "start": 0, "end": 2.5, "video_prompt": "surf"}]"#)?;
//! assert_eq!(scenes[0].id.to_string(), "1");
//! # Ok::<(), sceneloom_common::Error>(())
//! ```

mod plan;

pub use plan::{plan, validate, ScenePlan};

use sceneloom_common::{Error, Result, SceneId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One scene to generate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneDescriptor {
    #[serde(rename = "scene")]
    pub id: SceneId,
    pub start: f64,
    pub end: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dialogue: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub positive_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_frame_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_frame_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
}

/// Wire shape of a scene; ids are resolved after parsing.
#[derive(Debug, Deserialize)]
struct RawScene {
    #[serde(default)]
    scene: Option<SceneId>,
    #[serde(default)]
    start: Option<f64>,
    #[serde(default)]
    end: Option<f64>,
    #[serde(default)]
    dialogue: Option<String>,
    #[serde(default)]
    scenario: Option<String>,
    #[serde(default, alias = "positivePrompt")]
    positive_prompt: Option<String>,
    #[serde(default, alias = "videoPrompt")]
    video_prompt: Option<String>,
    #[serde(default, alias = "imagePrompt")]
    image_prompt: Option<String>,
    #[serde(default, alias = "firstFramePrompt")]
    first_frame_prompt: Option<String>,
    #[serde(default, alias = "lastFramePrompt")]
    last_frame_prompt: Option<String>,
    #[serde(default, alias = "negativePrompt")]
    negative_prompt: Option<String>,
}

impl RawScene {
    fn into_descriptor(self, index: usize) -> SceneDescriptor {
        SceneDescriptor {
            id: self.scene.unwrap_or_else(|| SceneId::positional(index)),
            start: self.start.unwrap_or(0.0),
            end: self.end.unwrap_or(0.0),
            dialogue: self.dialogue,
            scenario: self.scenario,
            positive_prompt: self.positive_prompt,
            video_prompt: self.video_prompt,
            image_prompt: self.image_prompt,
            first_frame_prompt: self.first_frame_prompt,
            last_frame_prompt: self.last_frame_prompt,
            negative_prompt: self.negative_prompt,
        }
    }
}

/// Prompt-bearing fields a pipeline stage can draw its text from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptField {
    Scenario,
    PositivePrompt,
    VideoPrompt,
    ImagePrompt,
    FirstFramePrompt,
    LastFramePrompt,
    Dialogue,
}

impl fmt::Display for PromptField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Scenario => "scenario",
            Self::PositivePrompt => "positive_prompt",
            Self::VideoPrompt => "video_prompt",
            Self::ImagePrompt => "image_prompt",
            Self::FirstFramePrompt => "first_frame_prompt",
            Self::LastFramePrompt => "last_frame_prompt",
            Self::Dialogue => "dialogue",
        };
        f.write_str(name)
    }
}

/// Per-scene values a stage can write into its payload besides prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneValue {
    /// The scene id, as a number or a string
    Scene,
    Start,
    End,
    /// `end - start`
    Duration,
    /// Duration with next-scene lookahead, as used for frame counts
    TargetDuration,
    /// Dialogue text, empty when absent
    Dialogue,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

impl SceneDescriptor {
    /// A prompt field's text, if present and not blank.
    pub fn prompt(&self, field: PromptField) -> Option<&str> {
        let value = match field {
            PromptField::Scenario => &self.scenario,
            PromptField::PositivePrompt => &self.positive_prompt,
            PromptField::VideoPrompt => &self.video_prompt,
            PromptField::ImagePrompt => &self.image_prompt,
            PromptField::FirstFramePrompt => &self.first_frame_prompt,
            PromptField::LastFramePrompt => &self.last_frame_prompt,
            PromptField::Dialogue => &self.dialogue,
        };
        non_blank(value)
    }

    /// The first non-blank prompt among `fields`, in order.
    pub fn resolve_prompt(&self, fields: &[PromptField]) -> Option<&str> {
        fields.iter().find_map(|field| self.prompt(*field))
    }

    /// The scene's negative prompt, if present and not blank.
    pub fn negative_prompt(&self) -> Option<&str> {
        non_blank(&self.negative_prompt)
    }
}

/// Parse a JSON array of scene objects.
///
/// Returns [`Error::EmptyInput`] for `[]` and [`Error::MalformedInput`] when
/// the document is not an array of objects.
pub fn parse(raw: &str) -> Result<Vec<SceneDescriptor>> {
    let document: Value =
        serde_json::from_str(raw).map_err(|e| Error::malformed(format!("invalid JSON: {e}")))?;

    let Value::Array(items) = document else {
        return Err(Error::malformed("expected a JSON array of scenes"));
    };

    if items.is_empty() {
        return Err(Error::EmptyInput);
    }

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            if !item.is_object() {
                return Err(Error::malformed(format!(
                    "scene at index {index} is not an object"
                )));
            }
            serde_json::from_value::<RawScene>(item)
                .map(|raw| raw.into_descriptor(index))
                .map_err(|e| Error::malformed(format!("scene at index {index}: {e}")))
        })
        .collect()
}
