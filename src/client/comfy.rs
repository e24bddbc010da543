use super::{ArtifactReference, ClientError, JobClient, JobHandle, JobRequest, PollResult};
use crate::config::RemoteConfig;
use reqwest::{Client, Method, RequestBuilder};
use serde_json::{json, Value};
use std::time::Duration;

/// Fields a submit response may carry the job id under.
const JOB_ID_FIELDS: [&str; 4] = ["prompt_id", "job_id", "id", "task_id"];

/// Output collections that may hold the artifact, in preference order.
const ARTIFACT_FIELDS: [&str; 3] = ["images", "gifs", "videos"];

/// HTTP client for a ComfyUI server.
pub struct ComfyClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    submit_timeout: Duration,
    poll_timeout: Duration,
}

impl ComfyClient {
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
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            submit_timeout: Duration::from_secs(config.submit_timeout_secs),
            poll_timeout: Duration::from_secs(config.poll_timeout_secs),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str, timeout: Duration) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path)).timeout(timeout);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait::async_trait]
impl JobClient for ComfyClient {
    async fn submit(&self, request: &JobRequest) -> Result<JobHandle, ClientError> {
        let response = self
            .request(Method::POST, "/prompt", self.submit_timeout)
            .json(&json!({ "prompt": request.workflow }))
            .send()
            .await
            .map_err(|e| ClientError::Submission(format!("failed to POST /prompt: {e}")))?;

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
        let path = format!("/history/{}", handle.job_id);
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
            .map_err(|e| ClientError::Transient(format!("unreadable history: {e}")))?;

        Ok(interpret_history(&body, handle))
    }

    async fn release_resources(&self) -> Result<(), ClientError> {
        let response = self
            .request(Method::POST, "/free", self.poll_timeout)
            .json(&json!({ "free_memory": true, "unload_models": true }))
            .send()
            .await
            .map_err(|e| ClientError::Transient(format!("failed to POST /free: {e}")))?;

        if !response.status().is_success() {
            return Err(ClientError::Transient(format!(
                "POST /free returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

pub(super) fn extract_job_id(body: &Value) -> Option<String> {
    JOB_ID_FIELDS.iter().find_map(|field| match body.get(*field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn interpret_history(body: &Value, handle: &JobHandle) -> PollResult {
    let Some(entry) = body.get(&handle.job_id) else {
        return PollResult::Pending;
    };

    if let Some(artifact) = entry
        .get("outputs")
        .and_then(|outputs| outputs.get(&handle.output_node))
        .and_then(first_artifact)
    {
        return PollResult::Completed(artifact);
    }

    let status = entry.get("status");
    let status_str = status
        .and_then(|s| s.get("status_str"))
        .and_then(Value::as_str);

    if status_str == Some("error") {
        return PollResult::Failed(error_message(status));
    }

    let completed = status
        .and_then(|s| s.get("completed"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if completed {
        return PollResult::Failed(format!(
            "job finished without output on node {}",
            handle.output_node
        ));
    }

    PollResult::Pending
}

fn first_artifact(node_outputs: &Value) -> Option<ArtifactReference> {
    ARTIFACT_FIELDS.iter().find_map(|field| {
        let item = node_outputs.get(*field)?.as_array()?.first()?;
        match item {
            Value::String(url) if !url.is_empty() => Some(ArtifactReference::new(url.clone())),
            Value::Object(_) => artifact_path(item),
            _ => None,
        }
    })
}

/// `type/subfolder/filename`, dropping empty segments.
fn artifact_path(item: &Value) -> Option<ArtifactReference> {
    let filename = item.get("filename").and_then(Value::as_str)?;
    if filename.is_empty() {
        return None;
    }

    let segment = |key: &str| item.get(key).and_then(Value::as_str).unwrap_or("");
    let path = [segment("type"), segment("subfolder"), filename]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/");

    Some(ArtifactReference::new(path))
}

fn error_message(status: Option<&Value>) -> String {
    let execution_error = status
        .and_then(|s| s.get("messages"))
        .and_then(Value::as_array)
        .and_then(|messages| {
            messages.iter().find_map(|message| {
                let pair = message.as_array()?;
                if pair.first()?.as_str()? != "execution_error" {
                    return None;
                }
                let data = pair.get(1)?;
                let exception = data.get("exception_message")?.as_str()?.trim();
                match data.get("node_type").and_then(Value::as_str) {
                    Some(node_type) => Some(format!("{node_type}: {exception}")),
                    None => Some(exception.to_string()),
                }
            })
        });

    execution_error.unwrap_or_else(|| "remote service reported status 'error'".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> JobHandle {
        JobHandle {
            job_id: "abc".into(),
            output_node: "58".into(),
        }
    }

    #[test]
    fn test_extract_job_id_fields() {
        assert_eq!(
            extract_job_id(&json!({ "prompt_id": "p-1", "number": 3 })),
            Some("p-1".to_string())
        );
        assert_eq!(extract_job_id(&json!({ "task_id": 42 })), Some("42".to_string()));
        assert_eq!(extract_job_id(&json!({ "prompt_id": "", "id": "x" })), Some("x".to_string()));
        assert_eq!(extract_job_id(&json!({ "status": "queued" })), None);
    }

    #[test]
    fn test_history_without_entry_is_pending() {
        assert_eq!(interpret_history(&json!({}), &handle()), PollResult::Pending);
    }

    #[test]
    fn test_history_with_image_output() {
        let body = json!({
            "abc": {
                "outputs": {
                    "58": { "images": [
                        { "filename": "scene_1_00001.png", "subfolder": "", "type": "output" }
                    ] }
                },
                "status": { "status_str": "success", "completed": true }
            }
        });

        assert_eq!(
            interpret_history(&body, &handle()),
            PollResult::Completed(ArtifactReference::new("output/scene_1_00001.png"))
        );
    }

    #[test]
    fn test_history_with_gif_output_and_subfolder() {
        let body = json!({
            "abc": { "outputs": { "58": { "gifs": [
                { "filename": "clip.mp4", "subfolder": "run7", "type": "output" }
            ] } } }
        });

        assert_eq!(
            interpret_history(&body, &handle()),
            PollResult::Completed(ArtifactReference::new("output/run7/clip.mp4"))
        );
    }

    #[test]
    fn test_history_ignores_other_nodes() {
        let body = json!({
            "abc": {
                "outputs": { "12": { "images": [{ "filename": "preview.png", "type": "temp" }] } },
                "status": { "status_str": "running", "completed": false }
            }
        });

        assert_eq!(interpret_history(&body, &handle()), PollResult::Pending);
    }

    #[test]
    fn test_history_error_status() {
        let body = json!({
            "abc": {
                "outputs": {},
                "status": {
                    "status_str": "error",
                    "completed": false,
                    "messages": [
                        ["execution_start", { "prompt_id": "abc" }],
                        ["execution_error", {
                            "node_type": "KSampler",
                            "exception_message": "CUDA out of memory\n"
                        }]
                    ]
                }
            }
        });

        assert_eq!(
            interpret_history(&body, &handle()),
            PollResult::Failed("KSampler: CUDA out of memory".to_string())
        );
    }

    #[test]
    fn test_history_completed_without_output() {
        let body = json!({
            "abc": { "outputs": {}, "status": { "status_str": "success", "completed": true } }
        });

        assert!(matches!(
            interpret_history(&body, &handle()),
            PollResult::Failed(msg) if msg.contains("node 58")
        ));
    }

    #[test]
    fn test_url_style_artifact() {
        let body = json!({
            "abc": { "outputs": { "58": { "videos": ["https://cdn.example/v/1.mp4"] } } }
        });

        assert_eq!(
            interpret_history(&body, &handle()),
            PollResult::Completed(ArtifactReference::new("https://cdn.example/v/1.mp4"))
        );
    }
}
