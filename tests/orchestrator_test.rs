//! Orchestrator behaviour against an instrumented in-memory job service.
//!
//! All tests run on a paused tokio clock, so poll intervals of seconds cost
//! nothing and elapsed times are exact.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use common::{
    image_to_video_pipeline, plans, policy, video_pipeline, video_prompt, MockJobClient, Step,
};
use sceneloom::client::JobClient;
use sceneloom::config::OrchestratorConfig;
use sceneloom::orchestrator::{Orchestrator, SceneOutcome, SceneStatus, NOT_DISPATCHED};
use sceneloom_common::SceneId;

fn by_scene(outcomes: &[SceneOutcome]) -> BTreeMap<String, SceneOutcome> {
    outcomes
        .iter()
        .map(|o| (o.scene.to_string(), o.clone()))
        .collect()
}

// ---------------------------------------------------------------------------
// Concurrency bound
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn never_exceeds_concurrency_limit() {
    let client = Arc::new(
        MockJobClient::scripted(|_| vec![Step::Pending, Step::Pending])
            .with_call_delay(Duration::from_millis(100)),
    );

    let report = Orchestrator::new(3)
        .run(plans(8), video_pipeline(policy(1, 10)), client.clone())
        .await;

    assert_eq!(report.outcomes.len(), 8);
    assert!(report.success);
    assert!(client.max_active_jobs() <= 3, "saw {}", client.max_active_jobs());
    assert!(client.max_in_flight_calls() <= 3);
    // the limit is actually used, not just respected
    assert_eq!(client.max_active_jobs(), 3);
}

#[tokio::test(start_paused = true)]
async fn concurrency_of_one_runs_scenes_one_at_a_time() {
    let client = Arc::new(MockJobClient::scripted(|_| vec![Step::Pending]));

    let report = Orchestrator::new(1)
        .run(plans(4), video_pipeline(policy(2, 5)), client.clone())
        .await;

    assert!(report.success);
    assert_eq!(client.max_active_jobs(), 1);
    // each scene waits two intervals (one pending poll, one completing poll)
    assert_eq!(report.total_duration_secs, 16.0);
}

// ---------------------------------------------------------------------------
// One outcome per scene, failure isolation
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn every_scene_gets_exactly_one_outcome() {
    let client = Arc::new(MockJobClient::scripted(|request| {
        match video_prompt(request).as_str() {
            "scene-2" => vec![Step::Reject("queue full".into())],
            "scene-4" => vec![Step::Pending, Step::Fail("CUDA out of memory".into())],
            "scene-5" => vec![Step::Pending; 10],
            _ => vec![Step::Pending],
        }
    }));

    let report = Orchestrator::new(2)
        .run(plans(6), video_pipeline(policy(1, 3)), client.clone())
        .await;

    assert_eq!(report.outcomes.len(), 6);
    assert!(!report.success);

    let outcomes = by_scene(&report.outcomes);
    let ids: Vec<&str> = outcomes.keys().map(String::as_str).collect();
    assert_eq!(ids, vec!["1", "2", "3", "4", "5", "6"]);

    for id in ["1", "3", "6"] {
        assert_eq!(outcomes[id].status, SceneStatus::Done, "scene {id}");
        assert!(outcomes[id].artifact.is_some());
    }

    let rejected = outcomes["2"].error.as_deref().unwrap();
    assert!(rejected.contains("SubmissionError"), "{rejected}");
    assert!(rejected.contains("queue full"));

    let remote = outcomes["4"].error.as_deref().unwrap();
    assert!(remote.contains("RemoteExecutionError"), "{remote}");
    assert!(remote.contains("CUDA out of memory"));

    let timed_out = outcomes["5"].error.as_deref().unwrap();
    assert!(timed_out.contains("PollTimeoutError"), "{timed_out}");
    assert!(timed_out.contains("after 3 attempts"));
}

#[tokio::test(start_paused = true)]
async fn sibling_failures_do_not_cancel_others() {
    let client = Arc::new(MockJobClient::scripted(|request| {
        if video_prompt(request) == "scene-1" {
            vec![Step::Fail("bad node".into())]
        } else {
            vec![Step::Pending, Step::Pending, Step::Pending]
        }
    }));

    let report = Orchestrator::new(4)
        .run(plans(4), video_pipeline(policy(1, 10)), client.clone())
        .await;

    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.done_count(), 3);
    // failures finish first, so they come first in completion order
    assert_eq!(report.outcomes[0].scene, SceneId::Number(1));
    // every scene was attempted exactly once
    assert_eq!(client.submit_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn panicking_pipeline_becomes_failed_outcome() {
    let client = Arc::new(MockJobClient::scripted(|request| {
        if video_prompt(request) == "scene-3" {
            vec![Step::Panic]
        } else {
            Vec::new()
        }
    }));

    let report = Orchestrator::new(2)
        .run(plans(5), video_pipeline(policy(1, 3)), client.clone())
        .await;

    assert_eq!(report.outcomes.len(), 5);
    let outcomes = by_scene(&report.outcomes);
    let error = outcomes["3"].error.as_deref().unwrap();
    assert!(error.contains("panicked"), "{error}");
    assert!(error.contains("mock service exploded"));
    assert_eq!(report.done_count(), 4);
}

// ---------------------------------------------------------------------------
// Retry arithmetic
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn transient_errors_then_success_take_k_plus_one_intervals() {
    let client = Arc::new(MockJobClient::scripted(|_| {
        vec![
            Step::Transient("connection reset".into()),
            Step::Transient("connection reset".into()),
            Step::Transient("502 Bad Gateway".into()),
            Step::Complete("output/scene_1_00001.mp4".into()),
        ]
    }));

    let report = Orchestrator::new(1)
        .run(plans(1), video_pipeline(policy(5, 10)), client.clone())
        .await;

    assert!(report.success);
    assert_eq!(client.poll_count(), 4);
    assert_eq!(report.outcomes[0].duration_secs, 20.0);
    assert_eq!(
        report.outcomes[0].artifact.as_ref().map(|a| a.as_str()),
        Some("output/scene_1_00001.mp4")
    );
}

#[tokio::test(start_paused = true)]
async fn pending_forever_exhausts_exactly_the_budget() {
    let client = Arc::new(MockJobClient::scripted(|_| vec![Step::Pending; 100]));

    let report = Orchestrator::new(1)
        .run(plans(1), video_pipeline(policy(2, 7)), client.clone())
        .await;

    assert_eq!(client.poll_count(), 7);
    let error = report.outcomes[0].error.as_deref().unwrap();
    assert!(error.contains("PollTimeoutError"), "{error}");
    assert_eq!(report.outcomes[0].duration_secs, 14.0);
}

#[tokio::test(start_paused = true)]
async fn remote_error_is_not_retried() {
    let client = Arc::new(MockJobClient::scripted(|_| {
        vec![Step::Fail("Prompt outputs failed validation".into())]
    }));

    let report = Orchestrator::new(1)
        .run(plans(1), video_pipeline(policy(5, 200)), client.clone())
        .await;

    assert_eq!(client.poll_count(), 1);
    assert_eq!(report.outcomes[0].status, SceneStatus::Failed);
    assert_eq!(report.outcomes[0].duration_secs, 5.0);
}

// ---------------------------------------------------------------------------
// Multi-stage chaining
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn image_artifact_feeds_video_stage_verbatim() {
    let client = Arc::new(MockJobClient::scripted(|request| {
        if request.stage == "image" {
            let prompt = request.workflow["6"]["inputs"]["text"].as_str().unwrap_or("");
            vec![Step::Complete(format!("output/{prompt} (final)_00001_.png"))]
        } else {
            vec![Step::Pending]
        }
    }));

    let report = Orchestrator::new(2)
        .run(plans(2), image_to_video_pipeline(policy(1, 5), false), client.clone())
        .await;

    assert!(report.success);
    let submitted = client.submitted();
    assert_eq!(submitted.len(), 4);

    for video in submitted.iter().filter(|r| r.stage == "video") {
        let prompt = video.workflow["93"]["inputs"]["text"].as_str().unwrap();
        let scene = prompt.trim_start_matches("motion-");
        assert_eq!(
            video.workflow["121"]["inputs"]["image_path"],
            format!("output/still-{scene} (final)_00001_.png")
        );
        assert_eq!(
            video.workflow["108"]["inputs"]["filename_prefix"],
            format!("out/video_test/scene_{scene}")
        );
    }

    for image in submitted.iter().filter(|r| r.stage == "image") {
        let prefix = image.workflow["60"]["inputs"]["filename_prefix"].as_str().unwrap();
        assert!(prefix.ends_with("_image"), "{prefix}");
    }
}

#[tokio::test(start_paused = true)]
async fn failed_first_stage_skips_later_stages() {
    let client = Arc::new(MockJobClient::scripted(|request| {
        if request.stage == "image" && request.workflow["6"]["inputs"]["text"] == "still-1" {
            vec![Step::Fail("out of VRAM".into())]
        } else {
            Vec::new()
        }
    }));

    let report = Orchestrator::new(2)
        .run(plans(2), image_to_video_pipeline(policy(1, 5), false), client.clone())
        .await;

    let outcomes = by_scene(&report.outcomes);
    let error = outcomes["1"].error.as_deref().unwrap();
    assert!(error.starts_with("image stage failed"), "{error}");
    assert_eq!(outcomes["2"].status, SceneStatus::Done);

    let stages: Vec<String> = client.submitted().iter().map(|r| r.stage.clone()).collect();
    assert_eq!(stages.iter().filter(|s| *s == "video").count(), 1);
}

#[tokio::test(start_paused = true)]
async fn frees_memory_between_stages_when_enabled() {
    let client = Arc::new(MockJobClient::new());

    Orchestrator::new(2)
        .run(plans(3), image_to_video_pipeline(policy(1, 5), true), client.clone())
        .await;
    assert_eq!(client.release_count(), 3);

    let client = Arc::new(MockJobClient::new());
    Orchestrator::new(2)
        .run(plans(3), image_to_video_pipeline(policy(1, 5), false), client.clone())
        .await;
    assert_eq!(client.release_count(), 0);
}

// ---------------------------------------------------------------------------
// Run timeout and determinism
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn run_timeout_stops_dispatch_but_lets_running_scenes_finish() {
    let client = Arc::new(MockJobClient::new());

    // each scene takes one 10s poll interval; only one runs at a time
    let report = Orchestrator::new(1)
        .with_run_timeout(Some(Duration::from_secs(15)))
        .run(plans(3), video_pipeline(policy(10, 5)), client.clone())
        .await;

    assert_eq!(report.outcomes.len(), 3);
    let outcomes = by_scene(&report.outcomes);
    assert_eq!(outcomes["1"].status, SceneStatus::Done);
    // dispatched at 10s, before the timeout, and allowed to finish at 20s
    assert_eq!(outcomes["2"].status, SceneStatus::Done);
    assert_eq!(outcomes["3"].error.as_deref(), Some(NOT_DISPATCHED));
    assert_eq!(client.submit_count(), 2);
    assert_eq!(report.total_duration_secs, 20.0);
}

#[tokio::test(start_paused = true)]
async fn run_timeout_beyond_the_clock_means_no_deadline() {
    let client = Arc::new(MockJobClient::new());

    let report = Orchestrator::new(1)
        .with_run_timeout(Some(Duration::MAX))
        .run(plans(2), video_pipeline(policy(1, 5)), client.clone())
        .await;

    assert!(report.success, "{:?}", report.outcomes);
    assert_eq!(client.submit_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn huge_configured_run_timeout_does_not_panic() {
    let client = Arc::new(MockJobClient::new());
    let config = OrchestratorConfig {
        concurrency: 2,
        run_timeout_secs: Some(1e19),
    };

    let report = Orchestrator::from_config(&config)
        .run(plans(3), video_pipeline(policy(1, 5)), client.clone())
        .await;

    assert!(report.success, "{:?}", report.outcomes);
    assert_eq!(report.outcomes.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn identical_runs_produce_the_same_outcomes() {
    fn script() -> MockJobClient {
        MockJobClient::scripted(|request| {
            let prompt = video_prompt(request);
            let done = Step::Complete(format!("output/{prompt}.mp4"));
            match prompt.as_str() {
                "scene-2" => vec![Step::Fail("nope".into())],
                "scene-3" => vec![Step::Pending, Step::Pending, done],
                _ => vec![Step::Pending, done],
            }
        })
    }

    let mut runs = Vec::new();
    for _ in 0..2 {
        let client: Arc<dyn JobClient> = Arc::new(script());
        let report = Orchestrator::new(2)
            .run(plans(4), video_pipeline(policy(1, 5)), client)
            .await;
        runs.push(by_scene(&report.outcomes));
    }

    assert_eq!(runs[0], runs[1]);
}

#[tokio::test(start_paused = true)]
async fn empty_plan_list_is_a_successful_run() {
    let client = Arc::new(MockJobClient::new());

    let report = Orchestrator::new(3)
        .run(Vec::new(), video_pipeline(policy(1, 5)), client.clone())
        .await;

    assert!(report.success);
    assert!(report.outcomes.is_empty());
    assert_eq!(client.submit_count(), 0);
}
