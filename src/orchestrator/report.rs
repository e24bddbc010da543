//! Per-scene outcomes and the run report.

use crate::client::ArtifactReference;
use chrono::{DateTime, Utc};
use sceneloom_common::{Error, SceneId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SceneStatus {
    Done,
    Failed,
}

/// What happened to one scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneOutcome {
    pub scene: SceneId,
    pub status: SceneStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_secs: f64,
}

fn round_secs(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100.0).round() / 100.0
}

impl SceneOutcome {
    pub fn done(scene: SceneId, artifact: ArtifactReference, elapsed: Duration) -> Self {
        Self {
            scene,
            status: SceneStatus::Done,
            artifact: Some(artifact),
            error: None,
            duration_secs: round_secs(elapsed),
        }
    }

    pub fn failed(scene: SceneId, error: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            scene,
            status: SceneStatus::Failed,
            artifact: None,
            error: Some(error.into()),
            duration_secs: round_secs(elapsed),
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == SceneStatus::Done
    }
}

/// The result of a run: one outcome per input scene, in completion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateReport {
    pub run_id: Uuid,
    /// True iff every outcome is `done`
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_directory: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub total_duration_secs: f64,
    pub outcomes: Vec<SceneOutcome>,
}

impl AggregateReport {
    pub fn new(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        outcomes: Vec<SceneOutcome>,
    ) -> Self {
        Self {
            run_id,
            success: outcomes.iter().all(SceneOutcome::is_done),
            output_directory: None,
            started_at,
            total_duration_secs: round_secs(elapsed),
            outcomes,
        }
    }

    /// A single-element report for an error that aborted the run.
    pub fn global_failure(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        error: &Error,
    ) -> Self {
        let outcome = SceneOutcome::failed(
            error.scene(),
            format!("{}: {}", error.kind(), error),
            elapsed,
        );
        Self::new(run_id, started_at, elapsed, vec![outcome])
    }

    pub fn with_output_directory(mut self, dir: PathBuf) -> Self {
        self.output_directory = Some(dir);
        self
    }

    pub fn done_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_done()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.done_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_requires_all_done() {
        let outcomes = vec![
            SceneOutcome::done(1.into(), ArtifactReference::new("a"), Duration::from_secs(1)),
            SceneOutcome::failed(2.into(), "boom", Duration::from_secs(2)),
        ];
        let report = AggregateReport::new(Uuid::new_v4(), Utc::now(), Duration::ZERO, outcomes);

        assert!(!report.success);
        assert_eq!(report.done_count(), 1);
        assert_eq!(report.failed_count(), 1);
    }

    #[test]
    fn test_empty_report_is_successful() {
        let report = AggregateReport::new(Uuid::new_v4(), Utc::now(), Duration::ZERO, vec![]);
        assert!(report.success);
        assert!(report.outcomes.is_empty());
    }

    #[test]
    fn test_global_failure_shape() {
        let err = Error::malformed("expected a JSON array of scenes");
        let report =
            AggregateReport::global_failure(Uuid::new_v4(), Utc::now(), Duration::ZERO, &err);

        assert!(!report.success);
        let value = serde_json::to_value(&report.outcomes).unwrap();
        assert_eq!(
            value,
            json!([{
                "scene": "N/A",
                "status": "failed",
                "error": "MalformedInputError: Malformed input: expected a JSON array of scenes",
                "duration_secs": 0.0
            }])
        );
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = SceneOutcome::done(
            3.into(),
            ArtifactReference::new("output/scene_3.mp4"),
            Duration::from_millis(12_340),
        );
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({
                "scene": 3,
                "status": "done",
                "artifact": "output/scene_3.mp4",
                "duration_secs": 12.34
            })
        );
    }
}
