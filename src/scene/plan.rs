use super::SceneDescriptor;
use crate::pipeline::PipelineVariant;
use sceneloom_common::{Error, Result};
use std::sync::Arc;

/// A validated scene with its target duration resolved.
#[derive(Debug, Clone)]
pub struct ScenePlan {
    pub scene: Arc<SceneDescriptor>,
    /// Seconds of media to generate: up to the next scene's start, or this
    /// scene's own end for the last one.
    pub duration_secs: f64,
}

fn target_duration(scene: &SceneDescriptor, next: Option<&SceneDescriptor>) -> f64 {
    match next {
        Some(next) => next.start - scene.start,
        None => scene.end - scene.start,
    }
}

/// Check every scene against the variant before anything is submitted.
///
/// Fails on the first offending scene, naming it.
pub fn validate(
    scenes: &[SceneDescriptor],
    variant: &PipelineVariant,
    default_negative_prompt: Option<&str>,
) -> Result<()> {
    let has_default_negative = default_negative_prompt.is_some_and(|s| !s.trim().is_empty());

    for (index, scene) in scenes.iter().enumerate() {
        if scene.end < scene.start {
            return Err(Error::validation(
                scene.id.clone(),
                format!("end ({}) is before start ({})", scene.end, scene.start),
            ));
        }

        let duration = target_duration(scene, scenes.get(index + 1));
        if duration < 0.0 {
            return Err(Error::validation(
                scene.id.clone(),
                format!(
                    "next scene starts at {} which is before this scene's start ({})",
                    scenes[index + 1].start,
                    scene.start
                ),
            ));
        }

        for stage in &variant.stages {
            if scene.resolve_prompt(&stage.prompt_fields).is_none() {
                let expected: Vec<String> =
                    stage.prompt_fields.iter().map(|f| f.to_string()).collect();
                return Err(Error::validation(
                    scene.id.clone(),
                    format!(
                        "missing prompt for stage '{}' (expected one of: {})",
                        stage.name,
                        expected.join(", ")
                    ),
                ));
            }
        }

        if variant.requires_negative_prompt
            && scene.negative_prompt().is_none()
            && !has_default_negative
        {
            return Err(Error::validation(
                scene.id.clone(),
                "missing 'negative_prompt'",
            ));
        }
    }

    Ok(())
}

/// Resolve each scene's target duration using the next scene's start.
pub fn plan(scenes: Vec<SceneDescriptor>) -> Vec<ScenePlan> {
    let durations: Vec<f64> = scenes
        .iter()
        .enumerate()
        .map(|(index, scene)| target_duration(scene, scenes.get(index + 1)).max(0.0))
        .collect();

    scenes
        .into_iter()
        .zip(durations)
        .map(|(scene, duration_secs)| ScenePlan {
            scene: Arc::new(scene),
            duration_secs,
        })
        .collect()
}
