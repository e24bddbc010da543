//! Shared test harness for integration tests.
//!
//! Provides [`MockJobClient`], an instrumented in-memory [`JobClient`] whose
//! poll results are scripted per submitted request, plus helpers to build
//! pipelines and scene plans without touching the network or the disk.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sceneloom::client::{
    ArtifactReference, ClientError, JobClient, JobHandle, JobRequest, PollResult,
};
use sceneloom::pipeline::{PipelineVariant, ScenePipeline, StageSettings, VariantKind};
use sceneloom::retry::RetryPolicy;
use sceneloom::scene::{self, ScenePlan};
use sceneloom_workflow::WorkflowTemplate;
use serde_json::{json, Value};

/// One scripted reaction of the mock service.
#[derive(Debug, Clone)]
pub enum Step {
    /// Refuse the submission
    Reject(String),
    /// Panic inside `submit`
    Panic,
    Pending,
    Transient(String),
    Complete(String),
    Fail(String),
}

type Script = dyn Fn(&JobRequest) -> Vec<Step> + Send + Sync;

/// In-memory job service with call accounting.
///
/// The script closure sees each submitted request and returns the steps that
/// job will go through. Once a job's steps run out it completes with
/// `output/<job_id>.png`.
pub struct MockJobClient {
    script: Box<Script>,
    call_delay: Duration,
    jobs: Mutex<HashMap<String, VecDeque<Step>>>,
    next_id: AtomicUsize,
    submitted: Mutex<Vec<JobRequest>>,
    polls: AtomicUsize,
    releases: AtomicUsize,
    active_jobs: AtomicUsize,
    max_active_jobs: AtomicUsize,
    in_flight_calls: AtomicUsize,
    max_in_flight_calls: AtomicUsize,
}

impl MockJobClient {
    /// Every job completes on its first poll.
    pub fn new() -> Self {
        Self::scripted(|_| Vec::new())
    }

    pub fn scripted<F>(script: F) -> Self
    where
        F: Fn(&JobRequest) -> Vec<Step> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            call_delay: Duration::ZERO,
            jobs: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
            polls: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            active_jobs: AtomicUsize::new(0),
            max_active_jobs: AtomicUsize::new(0),
            in_flight_calls: AtomicUsize::new(0),
            max_in_flight_calls: AtomicUsize::new(0),
        }
    }

    /// Make every submit and poll take this long.
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = delay;
        self
    }

    pub fn submitted(&self) -> Vec<JobRequest> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn submit_count(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// Most jobs that were submitted and not yet finished at the same time.
    pub fn max_active_jobs(&self) -> usize {
        self.max_active_jobs.load(Ordering::SeqCst)
    }

    pub fn max_in_flight_calls(&self) -> usize {
        self.max_in_flight_calls.load(Ordering::SeqCst)
    }

    fn raise(current: &AtomicUsize, max: &AtomicUsize) {
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
    }

    async fn call(&self) {
        Self::raise(&self.in_flight_calls, &self.max_in_flight_calls);
        if !self.call_delay.is_zero() {
            tokio::time::sleep(self.call_delay).await;
        }
        self.in_flight_calls.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl JobClient for MockJobClient {
    async fn submit(&self, request: &JobRequest) -> Result<JobHandle, ClientError> {
        self.call().await;
        self.submitted.lock().unwrap().push(request.clone());

        let mut steps: VecDeque<Step> = (self.script)(request).into();
        match steps.front() {
            Some(Step::Reject(message)) => return Err(ClientError::Submission(message.clone())),
            Some(Step::Panic) => panic!("mock service exploded"),
            _ => {}
        }
        steps.retain(|s| !matches!(s, Step::Reject(_) | Step::Panic));

        let job_id = format!("job-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.jobs.lock().unwrap().insert(job_id.clone(), steps);
        Self::raise(&self.active_jobs, &self.max_active_jobs);

        Ok(JobHandle {
            job_id,
            output_node: request.output_node.clone(),
        })
    }

    async fn poll(&self, handle: &JobHandle) -> Result<PollResult, ClientError> {
        self.call().await;
        self.polls.fetch_add(1, Ordering::SeqCst);

        let step = self
            .jobs
            .lock()
            .unwrap()
            .get_mut(&handle.job_id)
            .and_then(|steps| steps.pop_front());

        let result = match step {
            None => PollResult::Completed(ArtifactReference::new(format!(
                "output/{}.png",
                handle.job_id
            ))),
            Some(Step::Pending) => PollResult::Pending,
            Some(Step::Transient(message)) => return Err(ClientError::Transient(message)),
            Some(Step::Complete(artifact)) => PollResult::Completed(ArtifactReference::new(artifact)),
            Some(Step::Fail(message)) => PollResult::Failed(message),
            Some(Step::Reject(_) | Step::Panic) => PollResult::Pending,
        };

        if !matches!(result, PollResult::Pending) {
            self.active_jobs.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(result)
    }

    async fn release_resources(&self) -> Result<(), ClientError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Prompt text the video variant put into node 6.
pub fn video_prompt(request: &JobRequest) -> String {
    request.workflow["6"]["inputs"]["text"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

pub fn video_template() -> WorkflowTemplate {
    WorkflowTemplate::from_value(json!({
        "6": { "class_type": "CLIPTextEncode", "inputs": { "text": "" } },
        "7": { "class_type": "CLIPTextEncode", "inputs": { "text": "" } },
        "55": { "class_type": "EmptyLatentVideo", "inputs": { "length": 121 } },
        "57": { "class_type": "CreateVideo", "inputs": { "fps": 24 } },
        "58": { "class_type": "SaveVideo", "inputs": { "filename_prefix": "ComfyUI" } }
    }))
    .unwrap()
}

pub fn image_template() -> WorkflowTemplate {
    WorkflowTemplate::from_value(json!({
        "6": { "class_type": "CLIPTextEncode", "inputs": { "text": "" } },
        "60": { "class_type": "SaveImage", "inputs": { "filename_prefix": "ComfyUI" } }
    }))
    .unwrap()
}

pub fn i2v_video_template() -> WorkflowTemplate {
    WorkflowTemplate::from_value(json!({
        "93": { "inputs": { "text": "" } },
        "89": { "inputs": { "text": "" } },
        "98": { "inputs": { "length": 81 } },
        "94": { "inputs": { "fps": 16 } },
        "108": { "inputs": { "filename_prefix": "" } },
        "121": { "inputs": { "image_path": "" } }
    }))
    .unwrap()
}

pub fn settings() -> StageSettings {
    StageSettings {
        output_dir: PathBuf::from("out/video_test"),
        output_prefix: "{output_dir}/scene_{scene}".to_string(),
        default_fps: 24.0,
        default_negative_prompt: Some("blurry".to_string()),
        free_memory: false,
    }
}

pub fn video_pipeline(retry: RetryPolicy) -> Arc<ScenePipeline> {
    let templates = HashMap::from([("video".to_string(), video_template())]);
    Arc::new(
        ScenePipeline::new(
            PipelineVariant::builtin(VariantKind::Video),
            templates,
            settings(),
            retry,
        )
        .unwrap(),
    )
}

pub fn image_to_video_pipeline(retry: RetryPolicy, free_memory: bool) -> Arc<ScenePipeline> {
    let templates = HashMap::from([
        ("image".to_string(), image_template()),
        ("video".to_string(), i2v_video_template()),
    ]);
    let mut settings = settings();
    settings.free_memory = free_memory;
    Arc::new(
        ScenePipeline::new(
            PipelineVariant::builtin(VariantKind::ImageToVideo),
            templates,
            settings,
            retry,
        )
        .unwrap(),
    )
}

/// `count` one-second scenes with ids 1..=count and prompts `scene-<id>`.
pub fn scene_json(count: usize) -> String {
    let scenes: Vec<Value> = (1..=count)
        .map(|i| {
            json!({
                "scene": i,
                "start": (i - 1) as f64,
                "end": i as f64,
                "scenario": format!("scene-{i}"),
                "image_prompt": format!("still-{i}"),
                "video_prompt": format!("motion-{i}"),
                "negative_prompt": "low quality"
            })
        })
        .collect();
    Value::Array(scenes).to_string()
}

pub fn plans(count: usize) -> Vec<ScenePlan> {
    scene::plan(scene::parse(&scene_json(count)).unwrap())
}

/// Fast policy for tests running on a paused clock.
pub fn policy(interval_secs: u64, max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(Duration::from_secs(interval_secs), max_attempts)
}
