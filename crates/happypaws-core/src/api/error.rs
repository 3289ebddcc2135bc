use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Request rejected: {0}")]
    BadRequest(String),

    #[error("Network error: {0}")]
    Network(#[source] BoxError),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Token refresh failed: {0}")]
    RefreshFailed(#[source] Box<ApiError>),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    Validation(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Network(Box::new(err))
    }
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error payload the backend sends alongside non-2xx statuses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Prefer the backend's `message` field over the raw body.
    fn describe_body(body: &str) -> String {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(ErrorBody { message: Some(message) }) if !message.is_empty() => {
                Self::truncate_body(&message)
            }
            _ => Self::truncate_body(body),
        }
    }

    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let described = Self::describe_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(described),
            404 => ApiError::NotFound(described),
            429 => ApiError::RateLimited,
            400 | 409 | 422 => ApiError::BadRequest(described),
            500..=599 => ApiError::ServerError(described),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, described)),
        }
    }

    /// 401 and 403 both mean the credentials were not accepted.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ApiError::Unauthorized | ApiError::AccessDenied(_))
    }

    /// The caller should send the user back to a login prompt.
    pub fn requires_login(&self) -> bool {
        self.is_auth_failure() || matches!(self, ApiError::RefreshFailed(_))
    }
}
