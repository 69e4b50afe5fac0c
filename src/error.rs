use thiserror::Error;

use crate::api::ApiError;

/// Shown when a failed job carries no error message of its own.
pub const TASK_FAILED_FALLBACK: &str = "Task failed for an unknown reason";

/// Shown when a consistency or canon check fails without a message.
pub const CHECK_FAILED_FALLBACK: &str = "Check failed for an unknown reason";

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Job submission failed: {0}")]
    SubmissionFailed(String),

    #[error("Polling gave up after {attempts} attempts without a terminal status")]
    PollTimeout { attempts: u32 },

    #[error("Polling was canceled")]
    PollCanceled,

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("Unreadable status batch: {0}")]
    StreamDecode(String),

    #[error("Invalid gate thresholds: reject score {reject} must be below pass score {pass}")]
    Configuration { pass: f64, reject: f64 },

    #[error("Config error: {0}")]
    Config(String),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}
