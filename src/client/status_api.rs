use super::comfy::extract_job_id;
use super::{ArtifactReference, ClientError, JobClient, JobHandle, JobRequest, PollResult};
use crate::config::RemoteConfig;
use reqwest::{Client, Method, RequestBuilder};
use serde_json::Value;
use std::time::Duration;

/// `status` values meaning the job is finished.
const DONE_STATUSES: [&str; 4] = ["completed", "finished", "done", "success"];

/// `status` values meaning the job will never finish.
const FAILED_STATUSES: [&str; 4] = ["failed", "error", "cancelled", "canceled"];

/// Fields the finished job's artifact URL may appear under, in preference order.
const URL_FIELDS: [&str; 4] = ["video_url", "url", "download_url", "result_url"];

/// HTTP client for a plain JSON video API.
///
/// The request body is the `inputs` map of the stage's output node, so an
/// `api-video` template looks like
/// `{"request": {"inputs": {"prompt": "", "duration": 0}}}`. Jobs are polled
/// at `{status_path}/{job_id}` until `status` reports completion.
pub struct StatusApiClient {
    client: Client,
    base_url: String,
    submit_path: String,
    status_path: String,
    api_key: Option<String>,
    submit_timeout: Duration,
    poll_timeout: Duration,
}

impl StatusApiClient {
    pub fn new(config: &RemoteConfig) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.submit_timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client with timeout: {}", e);
                Client::new()
            });

        Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            submit_path: normalize_path(&config.submit_path),
            status_path: normalize_path(&config.status_path),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            submit_timeout: Duration::from_secs(config.submit_timeout_secs),
            poll_timeout: Duration::from_secs(config.poll_timeout_secs),
        }
    }

    fn request(&self, method: Method, path: &str, timeout: Duration) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .timeout(timeout);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait::async_trait]
impl JobClient for StatusApiClient {
    async fn submit(&self, request: &JobRequest) -> Result<JobHandle, ClientError> {
        let body = request
            .workflow
            .get(&request.output_node)
            .and_then(|node| node.get("inputs"))
            .filter(|inputs| inputs.is_object())
            .ok_or_else(|| {
                ClientError::Submission(format!(
                    "payload has no inputs on node {}",
                    request.output_node
                ))
            })?;

        let response = self
            .request(Method::POST, &self.submit_path, self.submit_timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                ClientError::Submission(format!("failed to POST {}: {e}", self.submit_path))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Submission(format!("{status}: {body}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ClientError::Submission(format!("unreadable response: {e}")))?;

        let job_id = extract_job_id(&body).ok_or_else(|| {
            ClientError::Submission(format!("response carried no job id: {body}"))
        })?;

        tracing::debug!(stage = %request.stage, job_id = %job_id, "Job accepted");

        Ok(JobHandle {
            job_id,
            output_node: request.output_node.clone(),
        })
    }

    async fn poll(&self, handle: &JobHandle) -> Result<PollResult, ClientError> {
        let path = format!("{}/{}", self.status_path, handle.job_id);
        let response = self
            .request(Method::GET, &path, self.poll_timeout)
            .send()
            .await
            .map_err(|e| ClientError::Transient(format!("failed to GET {path}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Transient(format!("GET {path} returned {status}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ClientError::Transient(format!("unreadable status: {e}")))?;

        Ok(interpret_status(&body))
    }
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.starts_with('/') || trimmed.is_empty() {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn interpret_status(body: &Value) -> PollResult {
    let status = body
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_lowercase();

    if DONE_STATUSES.contains(&status.as_str()) {
        let url = URL_FIELDS.iter().find_map(|field| {
            body.get(*field)
                .and_then(Value::as_str)
                .filter(|url| !url.is_empty())
        });
        return match url {
            Some(url) => PollResult::Completed(ArtifactReference::new(url)),
            None => PollResult::Failed(format!("job {status} without an artifact url")),
        };
    }

    if FAILED_STATUSES.contains(&status.as_str()) {
        let message = ["error", "message", "detail"]
            .iter()
            .find_map(|field| body.get(*field).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| format!("job {status}"));
        return PollResult::Failed(message);
    }

    PollResult::Pending
}
