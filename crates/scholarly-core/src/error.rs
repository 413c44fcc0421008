//! Error types for the research assistant client.

use reqwest::StatusCode;
use thiserror::Error;

/// Why a chat send was refused before anything went over the wire.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    #[error("message is empty")]
    Empty,

    #[error("still waiting for a response to the previous message")]
    Busy,

    #[error("this process is locked")]
    Locked,
}

/// Errors reported by the research backend.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ApiError {
    #[error("backend returned {status}: {detail}")]
    Status { status: StatusCode, detail: String },

    #[error("not authenticated with the backend, log in through the web app first")]
    Unauthorized,

    #[error("{0} is locked")]
    Locked(String),

    #[error("project {0} not found")]
    ProjectNotFound(String),
}

impl ApiError {
    /// Build an error from a non-2xx response body.
    ///
    /// FastAPI puts the message in a `detail` field; fall back to the raw body.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let detail = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
            .unwrap_or_else(|| body.trim().to_string());

        match status {
            StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
            StatusCode::FORBIDDEN => ApiError::Locked(detail),
            _ => ApiError::Status { status, detail },
        }
    }
}
