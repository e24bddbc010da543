use crate::pipeline::{StageMapping, VariantKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Which job API the remote service speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemoteKind {
    /// ComfyUI: `POST /prompt`, `GET /history/{id}`
    #[default]
    Comfy,
    /// Generic video API: `POST {submit_path}`, `GET {status_path}/{id}`
    StatusApi,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub kind: RemoteKind,

    /// Base URL of the generation service
    #[serde(default = "default_url")]
    pub url: String,

    /// Submit endpoint of a `status-api` service
    #[serde(default = "default_submit_path")]
    pub submit_path: String,

    /// Status endpoint of a `status-api` service; the job id is appended
    #[serde(default = "default_status_path")]
    pub status_path: String,

    /// Sent as `Authorization: Bearer <key>` when set
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_submit_timeout")]
    pub submit_timeout_secs: u64,

    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,

    /// Ask the service to unload models between pipeline stages
    #[serde(default = "default_free_memory")]
    pub free_memory: bool,
}

fn default_url() -> String {
    "http://127.0.0.1:8188".to_string()
}
fn default_submit_path() -> String {
    "/generate-video".to_string()
}
fn default_status_path() -> String {
    "/status".to_string()
}
fn default_submit_timeout() -> u64 {
    30
}
fn default_poll_timeout() -> u64 {
    10
}
fn default_free_memory() -> bool {
    true
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            kind: RemoteKind::default(),
            url: default_url(),
            submit_path: default_submit_path(),
            status_path: default_status_path(),
            api_key: None,
            submit_timeout_secs: default_submit_timeout(),
            poll_timeout_secs: default_poll_timeout(),
            free_memory: default_free_memory(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Seconds to wait before each poll (fractions allowed)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: f64,

    /// Poll attempts per stage before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_poll_interval() -> f64 {
    5.0
}
fn default_max_attempts() -> u32 {
    200
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrchestratorConfig {
    /// Maximum scenes in flight at once (1-20)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Stop dispatching new scenes after this many seconds
    #[serde(default)]
    pub run_timeout_secs: Option<f64>,
}

fn default_concurrency() -> usize {
    3
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            run_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Base directory for generated artifacts
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,

    /// Write into `{dir}/video_{suffix}`; the directory must not exist yet
    #[serde(default)]
    pub suffix: Option<String>,

    /// Write into `{dir}/video_{random}`
    #[serde(default)]
    pub random_suffix: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output/comfy_videos")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            suffix: None,
            random_suffix: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub variant: VariantKind,

    /// Frame rate used when a template has no readable fps input
    #[serde(default = "default_fps")]
    pub default_fps: f64,

    /// Used for scenes without a negative prompt
    #[serde(default)]
    pub default_negative_prompt: Option<String>,

    /// Pattern for the output node's `filename_prefix` (`{output_dir}`, `{scene}`)
    #[serde(default = "default_output_prefix")]
    pub output_prefix: String,

    /// Template name -> workflow JSON file
    #[serde(default = "default_templates")]
    pub templates: BTreeMap<String, PathBuf>,

    /// Replaces the built-in stage table of the selected variant
    #[serde(default)]
    pub stages: Option<Vec<StageMapping>>,
}

fn default_fps() -> f64 {
    24.0
}

fn default_output_prefix() -> String {
    "{output_dir}/scene_{scene}".to_string()
}

fn default_templates() -> BTreeMap<String, PathBuf> {
    [
        ("video", "workflows/video.json"),
        ("image", "workflows/image.json"),
        ("first_image", "workflows/first_image.json"),
        ("last_image", "workflows/last_image.json"),
        ("api_video", "workflows/api_video.json"),
    ]
    .into_iter()
    .map(|(name, path)| (name.to_string(), PathBuf::from(path)))
    .collect()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            variant: VariantKind::default(),
            default_fps: default_fps(),
            default_negative_prompt: None,
            output_prefix: default_output_prefix(),
            templates: default_templates(),
            stages: None,
        }
    }
}
