//! Per-scene pipelines.
//!
//! A [`ScenePipeline`] drives one scene through the stages of a
//! [`PipelineVariant`]: build the stage payload, submit it, wait for the
//! artifact, feed the artifact into later stages. The first failing stage ends
//! the scene; later stages never run.

mod stage;
mod state;
mod variant;

pub use stage::{
    build_request, frame_count, injections, output_prefix, scene_value, StageFailure,
    StageResult, StageSettings,
};
pub use state::SceneState;
pub use variant::{
    ArtifactInput, LengthMapping, NodeInput, PipelineVariant, SceneInput, StageMapping,
    VariantKind, API_REQUEST_NODE,
};

use crate::client::{ArtifactReference, ClientError, JobClient};
use crate::orchestrator::SceneOutcome;
use crate::retry::RetryPolicy;
use crate::scene::ScenePlan;
use sceneloom_common::{Error, Result};
use sceneloom_workflow::WorkflowTemplate;
use state::StateTracker;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use tokio::time::Instant;

/// Runs scenes through one variant's stages. Shared by every scene of a run.
#[derive(Debug)]
pub struct ScenePipeline {
    variant: PipelineVariant,
    templates: HashMap<String, WorkflowTemplate>,
    settings: StageSettings,
    retry: RetryPolicy,
}

impl ScenePipeline {
    /// Create a pipeline from already-loaded templates.
    pub fn new(
        variant: PipelineVariant,
        templates: HashMap<String, WorkflowTemplate>,
        settings: StageSettings,
        retry: RetryPolicy,
    ) -> Result<Self> {
        variant.check()?;

        for name in variant.template_names() {
            if !templates.contains_key(name) {
                return Err(Error::setup(format!("template '{name}' is not loaded")));
            }
        }

        Ok(Self {
            variant,
            templates,
            settings,
            retry,
        })
    }

    /// Create a pipeline, loading the templates the variant uses from disk.
    pub fn load(
        variant: PipelineVariant,
        template_files: &BTreeMap<String, PathBuf>,
        settings: StageSettings,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let mut templates = HashMap::new();

        for name in variant.template_names() {
            let path = template_files.get(name).ok_or_else(|| {
                Error::setup(format!("no file configured for template '{name}'"))
            })?;
            let template = WorkflowTemplate::load(path)
                .map_err(|e| Error::setup(format!("failed to load template '{name}': {e}")))?;
            tracing::debug!(template = name, path = ?path, nodes = template.len(), "Loaded template");
            templates.insert(name.to_string(), template);
        }

        Self::new(variant, templates, settings, retry)
    }

    pub fn variant(&self) -> &PipelineVariant {
        &self.variant
    }

    /// Run every stage for one scene. Never fails; errors become the outcome.
    pub async fn run(&self, plan: &ScenePlan, client: &dyn JobClient) -> SceneOutcome {
        let started = Instant::now();
        let scene = &plan.scene.id;
        let mut tracker = StateTracker::new(scene.clone());
        let mut artifacts: Vec<ArtifactReference> = Vec::with_capacity(self.variant.stages.len());

        for (index, stage) in self.variant.stages.iter().enumerate() {
            match self
                .run_stage(index, plan, client, &artifacts, &mut tracker)
                .await
            {
                Ok(artifact) => {
                    tracker.advance(SceneState::StageComplete { stage: index });
                    tracing::info!(
                        scene = %scene,
                        stage = %stage.name,
                        artifact = %artifact,
                        "Stage complete"
                    );
                    artifacts.push(artifact);

                    if !self.variant.is_final(index) && self.settings.free_memory {
                        if let Err(e) = client.release_resources().await {
                            tracing::warn!(scene = %scene, "Failed to free remote memory: {}", e);
                        }
                    }
                }
                Err(failure) => {
                    tracker.advance(SceneState::Failed);
                    tracing::warn!(scene = %scene, "{}", failure);
                    return SceneOutcome::failed(scene.clone(), failure.to_string(), started.elapsed());
                }
            }
        }

        let Some(artifact) = artifacts.pop() else {
            tracker.advance(SceneState::Failed);
            return SceneOutcome::failed(
                scene.clone(),
                "pipeline produced no artifact",
                started.elapsed(),
            );
        };

        tracker.advance(SceneState::Done);
        debug_assert!(tracker.state().is_terminal());
        SceneOutcome::done(scene.clone(), artifact, started.elapsed())
    }

    async fn run_stage(
        &self,
        index: usize,
        plan: &ScenePlan,
        client: &dyn JobClient,
        artifacts: &[ArtifactReference],
        tracker: &mut StateTracker,
    ) -> StageResult {
        let stage = &self.variant.stages[index];
        let started = Instant::now();
        let fail = |err: Error| StageFailure::new(&stage.name, &err, started.elapsed());

        let template = self
            .templates
            .get(&stage.template)
            .ok_or_else(|| fail(Error::setup(format!("template '{}' is not loaded", stage.template))))?;

        let request = build_request(
            stage,
            template,
            plan,
            &self.settings,
            self.variant.is_final(index),
            artifacts,
        )
        .map_err(fail)?;

        tracker.advance(SceneState::Submitting { stage: index });
        let handle = client
            .submit(&request)
            .await
            .map_err(|e| match e {
                ClientError::Submission(msg) | ClientError::Transient(msg) => {
                    fail(Error::submission(msg))
                }
            })?;

        tracing::info!(
            scene = %plan.scene.id,
            stage = %stage.name,
            job_id = %handle.job_id,
            "Job submitted"
        );

        tracker.advance(SceneState::Polling { stage: index });
        self.retry
            .wait_for_artifact(client, &handle)
            .await
            .map_err(fail)
    }
}
