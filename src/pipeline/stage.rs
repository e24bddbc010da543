//! Building one stage's payload.

use super::variant::StageMapping;
use crate::client::{ArtifactReference, JobRequest};
use crate::scene::{ScenePlan, SceneValue};
use sceneloom_common::{Error, Result, SceneId};
use sceneloom_workflow::{inject, Injection, VarContext, WorkflowTemplate};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Run-wide values every stage payload draws on.
#[derive(Debug, Clone)]
pub struct StageSettings {
    pub output_dir: PathBuf,
    /// Pattern with `{output_dir}` and `{scene}`
    pub output_prefix: String,
    pub default_fps: f64,
    pub default_negative_prompt: Option<String>,
    /// Call the service's free-memory endpoint between stages
    pub free_memory: bool,
}

/// Why a stage did not produce an artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct StageFailure {
    pub stage: String,
    pub kind: &'static str,
    pub message: String,
    pub elapsed: Duration,
}

impl StageFailure {
    pub fn new(stage: &str, error: &Error, elapsed: Duration) -> Self {
        Self {
            stage: stage.to_string(),
            kind: error.kind(),
            message: error.to_string(),
            elapsed,
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} stage failed after {:.1}s ({}): {}",
            self.stage,
            self.elapsed.as_secs_f64(),
            self.kind,
            self.message
        )
    }
}

pub type StageResult = std::result::Result<ArtifactReference, StageFailure>;

/// Frames needed to cover `duration_secs` at `fps`, rounded up.
pub fn frame_count(duration_secs: f64, fps: f64) -> u64 {
    (duration_secs * fps).ceil().max(0.0) as u64
}

/// A scene value as it goes into a payload.
pub fn scene_value(plan: &ScenePlan, source: SceneValue) -> Value {
    let scene = &plan.scene;
    match source {
        SceneValue::Scene => match &scene.id {
            SceneId::Number(n) => Value::from(*n),
            SceneId::Text(s) => Value::from(s.as_str()),
            SceneId::Other(value) => value.clone(),
        },
        SceneValue::Start => Value::from(scene.start),
        SceneValue::End => Value::from(scene.end),
        SceneValue::Duration => Value::from(scene.end - scene.start),
        SceneValue::TargetDuration => Value::from(plan.duration_secs),
        SceneValue::Dialogue => Value::from(scene.dialogue.as_deref().unwrap_or_default()),
    }
}

/// The output node's filename prefix for a stage.
pub fn output_prefix(
    settings: &StageSettings,
    plan: &ScenePlan,
    stage: &StageMapping,
    is_final: bool,
) -> String {
    let prefix = VarContext::new()
        .with_output_dir(&settings.output_dir)
        .with_var("scene", &plan.scene.id.to_string())
        .with_var("stage", &stage.name)
        .substitute(&settings.output_prefix);

    if is_final {
        prefix
    } else {
        format!("{}_{}", prefix, stage.name)
    }
}

/// Assemble the injections for one stage.
///
/// `artifacts` holds the references produced by the stages that already ran,
/// indexed by stage.
pub fn injections(
    stage: &StageMapping,
    template: &WorkflowTemplate,
    plan: &ScenePlan,
    settings: &StageSettings,
    is_final: bool,
    artifacts: &[ArtifactReference],
) -> Result<Vec<Injection>> {
    let scene = &plan.scene;
    let mut injections = Vec::new();

    let prompt = scene.resolve_prompt(&stage.prompt_fields).ok_or_else(|| {
        Error::validation(
            scene.id.clone(),
            format!("missing prompt for stage '{}'", stage.name),
        )
    })?;
    injections.push(Injection::new(&stage.prompt.node, &stage.prompt.key, prompt));

    if let Some(target) = &stage.negative {
        let negative = scene
            .negative_prompt()
            .or(settings.default_negative_prompt.as_deref());
        if let Some(negative) = negative {
            injections.push(Injection::new(&target.node, &target.key, negative));
        }
    }

    injections.push(Injection::new(
        &stage.output_node,
        &stage.output_key,
        output_prefix(settings, plan, stage, is_final),
    ));

    if let Some(length) = &stage.length {
        let fps = template
            .input_f64(&length.fps_source.node, &length.fps_source.key)
            .filter(|fps| fps.is_finite() && *fps > 0.0)
            .unwrap_or_else(|| {
                tracing::debug!(
                    stage = %stage.name,
                    node = %length.fps_source.node,
                    default_fps = settings.default_fps,
                    "No usable fps in template, using default"
                );
                settings.default_fps
            });
        let frames = frame_count(plan.duration_secs, fps);
        injections.push(Injection::new(&length.target.node, &length.target.key, frames));
    }

    for input in &stage.artifact_inputs {
        let artifact = artifacts.get(input.from_stage).ok_or_else(|| {
            Error::config(format!(
                "stage '{}' needs the artifact of stage {} which has not completed",
                stage.name, input.from_stage
            ))
        })?;
        injections.push(Injection::new(&input.node, &input.key, artifact.as_str()));
    }

    for input in &stage.scene_inputs {
        injections.push(Injection::new(
            &input.node,
            &input.key,
            scene_value(plan, input.source),
        ));
    }

    Ok(injections)
}

/// Build the request for one stage from its template.
pub fn build_request(
    stage: &StageMapping,
    template: &WorkflowTemplate,
    plan: &ScenePlan,
    settings: &StageSettings,
    is_final: bool,
    artifacts: &[ArtifactReference],
) -> Result<JobRequest> {
    let injections = injections(stage, template, plan, settings, is_final, artifacts)?;
    let injected = inject(template, &injections);

    for skipped in &injected.skipped {
        tracing::warn!(
            scene = %plan.scene.id,
            stage = %stage.name,
            node = %skipped.node,
            key = %skipped.key,
            "Template has no such node, input not set"
        );
    }

    Ok(JobRequest {
        stage: stage.name.clone(),
        workflow: injected.workflow,
        output_node: stage.output_node.clone(),
    })
}
