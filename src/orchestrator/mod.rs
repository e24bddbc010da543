//! Bounded fan-out of scene pipelines.
//!
//! Each scene gets its own task. A semaphore caps how many run at once, and a
//! single collector gathers outcomes as tasks finish. Every scene ends with
//! exactly one outcome: a failing or panicking scene never affects its
//! siblings, and scenes left undispatched by the run timeout are reported as
//! failed.
//!
//! # Example
//!
//! ```ignore
//! let orchestrator = Orchestrator::new(3).with_run_timeout(Some(Duration::from_secs(3600)));
//! let report = orchestrator.run(plans, Arc::new(pipeline), client).await;
//! println!("{}/{} scenes done", report.done_count(), report.outcomes.len());
//! ```

mod report;

pub use report::{AggregateReport, SceneOutcome, SceneStatus};

use crate::client::JobClient;
use crate::config::OrchestratorConfig;
use crate::pipeline::ScenePipeline;
use crate::scene::ScenePlan;
use chrono::Utc;
use futures::FutureExt;
use sceneloom_common::SceneId;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// Error recorded for scenes the run timeout kept from starting.
pub const NOT_DISPATCHED: &str = "not dispatched: run timeout elapsed";

pub struct Orchestrator {
    run_id: Uuid,
    concurrency: usize,
    run_timeout: Option<Duration>,
}

impl Orchestrator {
    pub fn new(concurrency: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            concurrency: concurrency.max(1),
            run_timeout: None,
        }
    }

    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(config.concurrency)
            .with_run_timeout(
                config
                    .run_timeout_secs
                    .and_then(|secs| Duration::try_from_secs_f64(secs).ok()),
            )
    }

    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    /// Stop dispatching new scenes once this much time has passed.
    /// Scenes already running are allowed to finish.
    pub fn with_run_timeout(mut self, run_timeout: Option<Duration>) -> Self {
        self.run_timeout = run_timeout;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run every plan through `pipeline` and collect the outcomes.
    pub async fn run(
        &self,
        plans: Vec<ScenePlan>,
        pipeline: Arc<ScenePipeline>,
        client: Arc<dyn JobClient>,
    ) -> AggregateReport {
        let started_at = Utc::now();
        let started = Instant::now();
        // a timeout past the clock's range means no deadline
        let deadline = self
            .run_timeout
            .and_then(|timeout| started.checked_add(timeout));
        let total = plans.len();

        tracing::info!(
            run_id = %self.run_id,
            scenes = total,
            concurrency = self.concurrency,
            "Starting run"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<SceneOutcome> = JoinSet::new();
        let mut collector = Collector::new(total);
        let mut queue = plans.into_iter();

        while let Some(plan) = queue.next() {
            let permit = loop {
                tokio::select! {
                    permit = acquire(&semaphore, deadline) => break permit,
                    Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                        collector.collect(joined);
                    }
                }
            };

            let Some(permit) = permit else {
                let skipped: Vec<ScenePlan> = std::iter::once(plan).chain(queue.by_ref()).collect();
                tracing::warn!(
                    run_id = %self.run_id,
                    skipped = skipped.len(),
                    "Run timeout elapsed, not dispatching remaining scenes"
                );
                for plan in skipped {
                    collector.push(SceneOutcome::failed(
                        plan.scene.id.clone(),
                        NOT_DISPATCHED,
                        Duration::ZERO,
                    ));
                }
                break;
            };

            collector.dispatched(plan.scene.id.clone());
            let span = tracing::info_span!("scene", scene = %plan.scene.id);
            let pipeline = Arc::clone(&pipeline);
            let client = Arc::clone(&client);

            tasks.spawn(
                async move {
                    let _permit = permit;
                    run_guarded(&pipeline, &plan, client.as_ref()).await
                }
                .instrument(span),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            collector.collect(joined);
        }

        let outcomes = collector.finish();
        let report = AggregateReport::new(self.run_id, started_at, started.elapsed(), outcomes);

        tracing::info!(
            run_id = %self.run_id,
            done = report.done_count(),
            failed = report.failed_count(),
            duration_secs = report.total_duration_secs,
            "Run finished"
        );

        report
    }
}

/// Wait for a free slot, giving up at the deadline.
async fn acquire(
    semaphore: &Arc<Semaphore>,
    deadline: Option<Instant>,
) -> Option<OwnedSemaphorePermit> {
    let acquire = Arc::clone(semaphore).acquire_owned();
    match deadline {
        Some(deadline) if Instant::now() >= deadline => None,
        Some(deadline) => tokio::time::timeout_at(deadline, acquire).await.ok()?.ok(),
        None => acquire.await.ok(),
    }
}

/// Run one pipeline, turning a panic into a failed outcome.
async fn run_guarded(
    pipeline: &ScenePipeline,
    plan: &ScenePlan,
    client: &dyn JobClient,
) -> SceneOutcome {
    let started = Instant::now();

    match AssertUnwindSafe(pipeline.run(plan, client)).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = panic_message(&*payload);
            tracing::error!(scene = %plan.scene.id, "Pipeline task panicked: {}", message);
            SceneOutcome::failed(
                plan.scene.id.clone(),
                format!("pipeline task panicked: {message}"),
                started.elapsed(),
            )
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Gathers outcomes in completion order and accounts for every dispatched scene.
struct Collector {
    total: usize,
    outcomes: Vec<SceneOutcome>,
    in_flight: Vec<SceneId>,
}

impl Collector {
    fn new(total: usize) -> Self {
        Self {
            total,
            outcomes: Vec::with_capacity(total),
            in_flight: Vec::new(),
        }
    }

    fn dispatched(&mut self, scene: SceneId) {
        self.in_flight.push(scene);
    }

    fn collect(&mut self, joined: Result<SceneOutcome, JoinError>) {
        match joined {
            Ok(outcome) => {
                if let Some(pos) = self.in_flight.iter().position(|id| *id == outcome.scene) {
                    self.in_flight.swap_remove(pos);
                }
                self.push(outcome);
            }
            Err(e) => tracing::error!("Scene task did not complete: {}", e),
        }
    }

    fn push(&mut self, outcome: SceneOutcome) {
        match &outcome.error {
            None => tracing::info!(
                "[{}/{}] Scene {} done",
                self.outcomes.len() + 1,
                self.total,
                outcome.scene
            ),
            Some(error) => tracing::warn!(
                "[{}/{}] Scene {} failed: {}",
                self.outcomes.len() + 1,
                self.total,
                outcome.scene,
                error
            ),
        }
        self.outcomes.push(outcome);
    }

    /// Outcomes for every scene, including any whose task vanished.
    fn finish(mut self) -> Vec<SceneOutcome> {
        for scene in std::mem::take(&mut self.in_flight) {
            self.push(SceneOutcome::failed(
                scene,
                "scene task was cancelled before reporting",
                Duration::ZERO,
            ));
        }
        self.outcomes
    }
}
