//! Pipeline variants as data.
//!
//! A variant is an ordered list of [`StageMapping`]s. Each mapping says which
//! template a stage uses and where in it the scene's prompts, the frame count,
//! the output prefix and earlier stages' artifacts go. Adding a variant means
//! adding a table, not a type.

use crate::config::PipelineConfig;
use crate::scene::{PromptField, SceneValue};
use sceneloom_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

/// Built-in pipeline shapes.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum VariantKind {
    /// Text prompt straight to video
    #[default]
    Video,
    /// Generate a still image, then animate it
    ImageToVideo,
    /// Generate first and last frames, then interpolate a video between them
    FirstLastToVideo,
    /// One request to a status-polling video API carrying prompt, duration and dialogue
    ApiVideo,
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Video => "video",
            Self::ImageToVideo => "image-to-video",
            Self::FirstLastToVideo => "first-last-to-video",
            Self::ApiVideo => "api-video",
        };
        f.write_str(name)
    }
}

/// A `nodes[node].inputs[key]` location in a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInput {
    pub node: String,
    pub key: String,
}

impl NodeInput {
    pub fn new(node: &str, key: &str) -> Self {
        Self {
            node: node.to_string(),
            key: key.to_string(),
        }
    }
}

/// Where the frame count goes and where the frame rate is read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LengthMapping {
    pub target: NodeInput,
    pub fps_source: NodeInput,
}

/// An earlier stage's artifact fed into this stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactInput {
    /// Index of the producing stage within the variant
    pub from_stage: usize,
    pub node: String,
    #[serde(default = "default_artifact_key")]
    pub key: String,
}

/// A per-scene value written into this stage's payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneInput {
    pub source: SceneValue,
    pub node: String,
    pub key: String,
}

impl SceneInput {
    pub fn new(source: SceneValue, node: &str, key: &str) -> Self {
        Self {
            source,
            node: node.to_string(),
            key: key.to_string(),
        }
    }
}

fn default_artifact_key() -> String {
    "image_path".to_string()
}

fn default_output_key() -> String {
    "filename_prefix".to_string()
}

/// How one stage's payload is assembled from its template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageMapping {
    pub name: String,

    /// Key into `pipeline.templates`
    pub template: String,

    /// Candidate prompt fields, first non-blank wins
    pub prompt_fields: Vec<PromptField>,

    pub prompt: NodeInput,

    #[serde(default)]
    pub negative: Option<NodeInput>,

    /// Receives the filename prefix and is polled for the artifact
    pub output_node: String,

    #[serde(default = "default_output_key")]
    pub output_key: String,

    #[serde(default)]
    pub length: Option<LengthMapping>,

    #[serde(default)]
    pub artifact_inputs: Vec<ArtifactInput>,

    #[serde(default)]
    pub scene_inputs: Vec<SceneInput>,
}

/// An ordered stage table plus the checks it implies.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineVariant {
    pub kind: VariantKind,
    pub stages: Vec<StageMapping>,
    pub requires_negative_prompt: bool,
}

/// Node holding the request body in `api-video` templates.
pub const API_REQUEST_NODE: &str = "request";

fn text(node: &str) -> NodeInput {
    NodeInput::new(node, "text")
}

fn length(target: &str, fps_source: &str) -> Option<LengthMapping> {
    Some(LengthMapping {
        target: NodeInput::new(target, "length"),
        fps_source: NodeInput::new(fps_source, "fps"),
    })
}

fn artifact(from_stage: usize, node: &str) -> ArtifactInput {
    ArtifactInput {
        from_stage,
        node: node.to_string(),
        key: default_artifact_key(),
    }
}

fn image_stage(name: &str, fields: Vec<PromptField>, prompt: &str, output: &str) -> StageMapping {
    StageMapping {
        name: name.to_string(),
        template: name.to_string(),
        prompt_fields: fields,
        prompt: text(prompt),
        negative: None,
        output_node: output.to_string(),
        output_key: default_output_key(),
        length: None,
        artifact_inputs: Vec::new(),
        scene_inputs: Vec::new(),
    }
}

impl PipelineVariant {
    /// The built-in stage table for a variant.
    pub fn builtin(kind: VariantKind) -> Self {
        use PromptField::*;

        match kind {
            VariantKind::Video => Self {
                kind,
                stages: vec![StageMapping {
                    name: "video".to_string(),
                    template: "video".to_string(),
                    prompt_fields: vec![Scenario, VideoPrompt, PositivePrompt],
                    prompt: text("6"),
                    negative: Some(text("7")),
                    output_node: "58".to_string(),
                    output_key: default_output_key(),
                    length: length("55", "57"),
                    artifact_inputs: Vec::new(),
                    scene_inputs: Vec::new(),
                }],
                requires_negative_prompt: false,
            },
            VariantKind::ImageToVideo => Self {
                kind,
                stages: vec![
                    image_stage("image", vec![ImagePrompt, PositivePrompt], "6", "60"),
                    StageMapping {
                        name: "video".to_string(),
                        template: "video".to_string(),
                        prompt_fields: vec![VideoPrompt, PositivePrompt],
                        prompt: text("93"),
                        negative: Some(text("89")),
                        output_node: "108".to_string(),
                        output_key: default_output_key(),
                        length: length("98", "94"),
                        artifact_inputs: vec![artifact(0, "121")],
                        scene_inputs: Vec::new(),
                    },
                ],
                requires_negative_prompt: true,
            },
            VariantKind::FirstLastToVideo => {
                let mut last_image =
                    image_stage("last_image", vec![LastFramePrompt, PositivePrompt], "16", "10");
                last_image.artifact_inputs = vec![artifact(0, "18")];

                Self {
                    kind,
                    stages: vec![
                        image_stage(
                            "first_image",
                            vec![FirstFramePrompt, PositivePrompt],
                            "6",
                            "60",
                        ),
                        last_image,
                        StageMapping {
                            name: "video".to_string(),
                            template: "video".to_string(),
                            prompt_fields: vec![VideoPrompt],
                            prompt: text("20"),
                            negative: Some(text("7")),
                            output_node: "14".to_string(),
                            output_key: default_output_key(),
                            length: length("22", "12"),
                            artifact_inputs: vec![artifact(0, "23"), artifact(1, "24")],
                            scene_inputs: Vec::new(),
                        },
                    ],
                    requires_negative_prompt: true,
                }
            }
            VariantKind::ApiVideo => Self {
                kind,
                stages: vec![StageMapping {
                    name: "video".to_string(),
                    template: "api_video".to_string(),
                    prompt_fields: vec![Scenario, VideoPrompt, PositivePrompt],
                    prompt: NodeInput::new(API_REQUEST_NODE, "prompt"),
                    negative: None,
                    output_node: API_REQUEST_NODE.to_string(),
                    output_key: "output_prefix".to_string(),
                    length: None,
                    artifact_inputs: Vec::new(),
                    scene_inputs: vec![
                        SceneInput::new(SceneValue::Duration, API_REQUEST_NODE, "duration"),
                        SceneInput::new(SceneValue::Scene, API_REQUEST_NODE, "scene_id"),
                        SceneInput::new(SceneValue::Dialogue, API_REQUEST_NODE, "dialogue"),
                    ],
                }],
                requires_negative_prompt: false,
            },
        }
    }

    /// Resolve the configured variant, honouring a custom stage table.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let mut variant = Self::builtin(config.variant);
        if let Some(stages) = &config.stages {
            variant.stages = stages.clone();
        }

        variant.check()?;

        for name in variant.template_names() {
            if !config.templates.contains_key(name) {
                return Err(Error::config(format!(
                    "no file configured for template '{name}' in pipeline.templates"
                )));
            }
        }

        Ok(variant)
    }

    /// Structural checks on the stage table.
    pub fn check(&self) -> Result<()> {
        if self.stages.is_empty() {
            return Err(Error::config("a pipeline needs at least one stage"));
        }

        let mut seen = HashSet::new();
        for (index, stage) in self.stages.iter().enumerate() {
            if !seen.insert(stage.name.as_str()) {
                return Err(Error::config(format!(
                    "duplicate stage name '{}'",
                    stage.name
                )));
            }
            if stage.prompt_fields.is_empty() {
                return Err(Error::config(format!(
                    "stage '{}' has no prompt fields",
                    stage.name
                )));
            }
            for input in &stage.artifact_inputs {
                if input.from_stage >= index {
                    return Err(Error::config(format!(
                        "stage '{}' takes an artifact from stage {} which does not run before it",
                        stage.name, input.from_stage
                    )));
                }
            }
        }

        Ok(())
    }

    /// Names of the templates the stages use.
    pub fn template_names(&self) -> BTreeSet<&str> {
        self.stages.iter().map(|s| s.template.as_str()).collect()
    }

    /// Whether `index` is the last stage.
    pub fn is_final(&self, index: usize) -> bool {
        index + 1 == self.stages.len()
    }
}
