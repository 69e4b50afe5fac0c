use thiserror::Error;

/// Transport-level failures talking to the job service.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("API returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Failed to parse API response: {0}")]
    Parse(String),
}
