//! Run entry point: parse, validate, set up, orchestrate.
//!
//! Global problems (malformed input, a scene failing validation, an output
//! directory or template that cannot be prepared) stop the run before any job
//! is submitted and produce a single-element report. Empty input is a
//! successful run with no outcomes.

use crate::client::JobClient;
use crate::config::Config;
use crate::orchestrator::{AggregateReport, Orchestrator};
use crate::output::prepare_output_dir;
use crate::pipeline::{PipelineVariant, ScenePipeline, StageSettings};
use crate::retry::RetryPolicy;
use crate::scene::{self, SceneDescriptor, ScenePlan};
use chrono::Utc;
use sceneloom_common::{Error, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Instant;
use uuid::Uuid;

pub struct Runner {
    config: Config,
    client: Arc<dyn JobClient>,
    run_id: Uuid,
    trigger: Option<i64>,
}

enum Prepared {
    Empty,
    Ready {
        plans: Vec<ScenePlan>,
        pipeline: ScenePipeline,
        output_dir: PathBuf,
    },
}

impl Runner {
    pub fn new(config: Config, client: Arc<dyn JobClient>) -> Self {
        Self {
            config,
            client,
            run_id: Uuid::new_v4(),
            trigger: None,
        }
    }

    /// Tag the run with an external trigger value. Only logged.
    pub fn with_trigger(mut self, trigger: i64) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Run every scene in `raw` (a JSON array) and report the outcomes.
    pub async fn run(&self, raw: &str) -> AggregateReport {
        let started_at = Utc::now();
        let started = Instant::now();

        tracing::info!(
            run_id = %self.run_id,
            trigger = ?self.trigger,
            variant = %self.config.pipeline.variant,
            url = %self.config.remote.url,
            "Run requested"
        );

        match self.prepare(raw) {
            Ok(Prepared::Empty) => {
                tracing::info!(run_id = %self.run_id, "No scenes provided, nothing to do");
                AggregateReport::new(self.run_id, started_at, started.elapsed(), Vec::new())
            }
            Ok(Prepared::Ready {
                plans,
                pipeline,
                output_dir,
            }) => Orchestrator::from_config(&self.config.orchestrator)
                .with_run_id(self.run_id)
                .run(plans, Arc::new(pipeline), Arc::clone(&self.client))
                .await
                .with_output_directory(output_dir),
            Err(err) => {
                tracing::error!(run_id = %self.run_id, kind = err.kind(), "Run aborted: {}", err);
                AggregateReport::global_failure(self.run_id, started_at, started.elapsed(), &err)
            }
        }
    }

    fn prepare(&self, raw: &str) -> Result<Prepared> {
        let scenes = match check(&self.config, raw) {
            Err(Error::EmptyInput) => return Ok(Prepared::Empty),
            other => other?,
        };
        let variant = PipelineVariant::from_config(&self.config.pipeline)?;

        let output_dir = prepare_output_dir(&self.config.output)?;
        let settings = StageSettings {
            output_dir: output_dir.clone(),
            output_prefix: self.config.pipeline.output_prefix.clone(),
            default_fps: self.config.pipeline.default_fps,
            default_negative_prompt: self.config.pipeline.default_negative_prompt.clone(),
            free_memory: self.config.remote.free_memory,
        };
        let pipeline = ScenePipeline::load(
            variant,
            &self.config.pipeline.templates,
            settings,
            RetryPolicy::from_config(&self.config.retry)?,
        )?;

        Ok(Prepared::Ready {
            plans: scene::plan(scenes),
            pipeline,
            output_dir,
        })
    }
}

/// Parse and validate scenes against the configured variant without running them.
pub fn check(config: &Config, raw: &str) -> Result<Vec<SceneDescriptor>> {
    let variant = PipelineVariant::from_config(&config.pipeline)?;
    let scenes = scene::parse(raw)?;
    scene::validate(
        &scenes,
        &variant,
        config.pipeline.default_negative_prompt.as_deref(),
    )?;
    Ok(scenes)
}
