//! The contract with the remote generation service.
//!
//! A [`JobClient`] submits one workflow payload and polls it. Each `poll` call
//! is a single attempt; retry pacing belongs to [`crate::retry::RetryPolicy`].

mod comfy;
mod status_api;

pub use comfy::ComfyClient;
pub use status_api::StatusApiClient;

use crate::config::{RemoteConfig, RemoteKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// One stage's payload, ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub stage: String,
    pub workflow: Value,
    /// Node whose outputs hold the artifact
    pub output_node: String,
}

/// A submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub job_id: String,
    pub output_node: String,
}

/// Where the remote service put a finished artifact.
///
/// Opaque to the orchestrator; it is passed as-is into later stages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactReference(String);

impl ArtifactReference {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a single poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResult {
    Pending,
    Completed(ArtifactReference),
    /// The job ran and the service reported it failed
    Failed(String),
}

/// Errors raised by a client call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The job was not accepted. Never retried.
    #[error("submission failed: {0}")]
    Submission(String),

    /// Transport failure, timeout or non-2xx reply. Consumes one poll attempt.
    #[error("{0}")]
    Transient(String),
}

/// Submit-and-poll access to a generation service.
#[async_trait::async_trait]
pub trait JobClient: Send + Sync {
    /// Send a payload and return the job's handle.
    async fn submit(&self, request: &JobRequest) -> Result<JobHandle, ClientError>;

    /// Ask once whether the job has finished.
    async fn poll(&self, handle: &JobHandle) -> Result<PollResult, ClientError>;

    /// Ask the service to free memory between stages.
    async fn release_resources(&self) -> Result<(), ClientError> {
        Ok(())
    }
}

/// Build the client selected by `[remote] kind`.
pub fn from_config(config: &RemoteConfig) -> Arc<dyn JobClient> {
    match config.kind {
        RemoteKind::Comfy => Arc::new(ComfyClient::new(config)),
        RemoteKind::StatusApi => Arc::new(StatusApiClient::new(config)),
    }
}
