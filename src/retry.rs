//! Poll pacing and give-up rules.
//!
//! Every stage of every pipeline waits for its job through the same
//! [`RetryPolicy`]: sleep the poll interval, poll once, repeat until the job
//! completes, fails, or the attempt budget runs out.

use crate::client::{ArtifactReference, ClientError, JobClient, JobHandle, PollResult};
use crate::config::RetryConfig;
use sceneloom_common::{Error, Result};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    poll_interval: Duration,
    max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), 200)
    }
}

impl RetryPolicy {
    pub fn new(poll_interval: Duration, max_attempts: u32) -> Self {
        Self {
            poll_interval,
            max_attempts,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Result<Self> {
        let interval = Duration::try_from_secs_f64(config.poll_interval_secs).map_err(|e| {
            Error::config(format!(
                "retry.poll_interval_secs {} is not a usable duration: {e}",
                config.poll_interval_secs
            ))
        })?;
        Ok(Self::new(interval, config.max_attempts))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether another attempt may be made after `attempt` attempts.
    ///
    /// Submission errors are never retried.
    pub fn should_retry(&self, attempt: u32, last_error: Option<&ClientError>) -> bool {
        if matches!(last_error, Some(ClientError::Submission(_))) {
            return false;
        }
        attempt < self.max_attempts
    }

    pub fn delay_before_next_attempt(&self) -> Duration {
        self.poll_interval
    }

    /// Poll `handle` until it yields an artifact.
    ///
    /// A remote failure ends the wait at once with [`Error::RemoteExecution`].
    /// Running out of attempts yields [`Error::PollTimeout`] carrying the last
    /// transient error seen.
    pub async fn wait_for_artifact(
        &self,
        client: &dyn JobClient,
        handle: &JobHandle,
    ) -> Result<ArtifactReference> {
        let mut attempt = 0;
        let mut last_error: Option<ClientError> = None;

        while self.should_retry(attempt, last_error.as_ref()) {
            tokio::time::sleep(self.delay_before_next_attempt()).await;
            attempt += 1;

            match client.poll(handle).await {
                Ok(PollResult::Completed(artifact)) => {
                    tracing::debug!(job_id = %handle.job_id, attempt, "Job completed");
                    return Ok(artifact);
                }
                Ok(PollResult::Failed(message)) => {
                    return Err(Error::remote(message));
                }
                Ok(PollResult::Pending) => {
                    tracing::trace!(
                        job_id = %handle.job_id,
                        attempt,
                        max_attempts = self.max_attempts,
                        "Job still running"
                    );
                }
                Err(ClientError::Submission(message)) => {
                    return Err(Error::submission(message));
                }
                Err(err @ ClientError::Transient(_)) => {
                    tracing::warn!(
                        job_id = %handle.job_id,
                        attempt,
                        max_attempts = self.max_attempts,
                        "Poll failed: {}",
                        err
                    );
                    last_error = Some(err);
                }
            }
        }

        Err(Error::PollTimeout {
            attempts: attempt,
            last_error: last_error.map(|e| e.to_string()),
        })
    }
}
