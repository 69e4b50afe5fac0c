pub mod client;
pub mod error;
pub mod types;

pub use client::{JobClient, PollOptions, SubmitJob};
pub use error::ApiError;
pub use types::{JobEnvelope, SubmitRequest};
