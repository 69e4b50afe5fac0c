//! Wire types for the job submission and status endpoints.
//!
//! The backend exposes `POST /jobs` for creation and `GET /jobs/{id}` for
//! single-job status; both wrap the job record in a `{"job": ...}`
//! envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::job::{Job, JobKind};

/// Request body for `POST /jobs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    /// Task kind. Serialized as `"type"` per the submission contract.
    #[serde(rename = "type")]
    pub kind: JobKind,
    /// Task-specific payload, including the owning `chapter_id`.
    pub input: Value,
    /// Client-generated correlation token for this submission.
    pub client_ref: String,
}

/// Envelope wrapping a single job in submission and status responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub job: Job,
}
