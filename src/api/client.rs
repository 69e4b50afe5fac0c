use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::error::ApiError;
use super::types::{JobEnvelope, SubmitRequest};
use crate::error::{TASK_FAILED_FALLBACK, TrackerError};
use crate::job::{Job, JobKind, JobStatus};

/// Submits generation jobs and fetches their status from the backend.
pub struct JobClient {
    client: Client,
    base_url: String,
}

/// Bounds and cancellation for a single poll loop.
///
/// Every call to [`JobClient::poll_until_terminal`] owns its options, so
/// two concurrent polls of the same job id keep independent attempt
/// counters and cancel signals.
#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Spacing between status fetches.
    pub interval: Duration,
    /// Hard attempt ceiling before giving up with a timeout.
    pub max_attempts: u32,
    /// Triggering this stops the loop with no further network calls.
    pub cancel: CancellationToken,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 150,
            cancel: CancellationToken::new(),
        }
    }
}

/// Job submission seam for the workflow layer.
pub trait SubmitJob {
    async fn submit_job(&self, kind: JobKind, input: Value) -> Result<Job, TrackerError>;
}

impl JobClient {
    /// Create a client against the given API base URL (no trailing slash).
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Submit a job for execution.
    ///
    /// Any non-success transport response is a submission failure; no
    /// local state changes on failure. On success the server-assigned job
    /// is returned in its initial non-terminal status — the caller is
    /// responsible for inserting it into an active set.
    pub async fn submit(&self, kind: JobKind, input: Value) -> Result<Job, TrackerError> {
        let url = format!("{}/jobs", self.base_url);
        let req = SubmitRequest {
            kind,
            input,
            client_ref: uuid::Uuid::new_v4().to_string(),
        };

        let response = self
            .client
            .post(&url)
            .json(&req)
            .send()
            .await
            .map_err(|e| TrackerError::SubmissionFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(TrackerError::SubmissionFailed(format!(
                "status {}: {message}",
                status.as_u16()
            )));
        }

        let body = response
            .json::<JobEnvelope>()
            .await
            .map_err(|e| TrackerError::SubmissionFailed(e.to_string()))?;

        tracing::info!(job_id = %body.job.id, kind = %body.job.kind, "job submitted");
        Ok(body.job)
    }

    /// Fetch the current status of a single job.
    pub async fn fetch(&self, job_id: &str) -> Result<Job, ApiError> {
        let url = format!("{}/jobs/{job_id}", self.base_url);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(1000);
            return Err(ApiError::RateLimited {
                retry_after_ms: retry_after,
            });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .json::<JobEnvelope>()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))?;
        Ok(body.job)
    }

    /// Poll a job until it reaches a terminal status.
    ///
    /// Resolves with the job's output on success; rejects with
    /// [`TrackerError::TaskFailed`] when the task reports failure, with
    /// [`TrackerError::PollTimeout`] after `max_attempts` fruitless polls,
    /// and with [`TrackerError::PollCanceled`] once the cancel token is
    /// triggered. A fetch error consumes an attempt and the loop carries
    /// on. `on_status` fires at most once per distinct observed status, so
    /// callers can drive phase transitions without being flooded by
    /// repeated identical polls.
    pub async fn poll_until_terminal(
        &self,
        job_id: &str,
        opts: &PollOptions,
        mut on_status: impl FnMut(JobStatus),
    ) -> Result<Value, TrackerError> {
        let mut last_seen: Option<JobStatus> = None;

        for attempt in 1..=opts.max_attempts {
            if opts.cancel.is_cancelled() {
                return Err(TrackerError::PollCanceled);
            }

            match self.fetch(job_id).await {
                Ok(job) => {
                    // Cancellation during the in-flight fetch suppresses
                    // its effect rather than aborting the request.
                    if opts.cancel.is_cancelled() {
                        return Err(TrackerError::PollCanceled);
                    }

                    if last_seen != Some(job.status) {
                        last_seen = Some(job.status);
                        on_status(job.status);
                    }

                    match job.status {
                        JobStatus::Succeeded => {
                            return Ok(job.output.unwrap_or(Value::Null));
                        }
                        JobStatus::Failed => {
                            return Err(TrackerError::TaskFailed(
                                job.error
                                    .unwrap_or_else(|| TASK_FAILED_FALLBACK.to_string()),
                            ));
                        }
                        JobStatus::Canceled => {
                            return Err(TrackerError::TaskFailed(
                                "job was canceled before completion".to_string(),
                            ));
                        }
                        JobStatus::Queued | JobStatus::Running => {}
                    }
                }
                Err(e) => {
                    tracing::debug!(job_id, attempt, error = %e, "status fetch failed, will retry");
                }
            }

            if attempt < opts.max_attempts {
                tokio::select! {
                    _ = opts.cancel.cancelled() => return Err(TrackerError::PollCanceled),
                    _ = tokio::time::sleep(opts.interval) => {}
                }
            }
        }

        Err(TrackerError::PollTimeout {
            attempts: opts.max_attempts,
        })
    }
}

impl SubmitJob for JobClient {
    async fn submit_job(&self, kind: JobKind, input: Value) -> Result<Job, TrackerError> {
        self.submit(kind, input).await
    }
}
