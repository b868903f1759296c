use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Credentials rejected (status {status})")]
    CredentialsRejected { status: StatusCode },

    #[error("Token refresh rejected (status {status})")]
    RefreshRejected { status: StatusCode },

    #[error("Session expired. Please login again.")]
    SessionExpired,

    #[error("Unauthorized. Please login.")]
    Unauthorized,

    #[error("Request failed with status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Invalid MIME type for upload: {0}")]
    InvalidMime(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    pub fn from_status(status: StatusCode, body: &str) -> Self {
        ApiError::Status {
            status,
            body: Self::truncate_body(body),
        }
    }

    /// True for the errors that end the session and require a new login.
    pub fn requires_login(&self) -> bool {
        matches!(self, ApiError::SessionExpired | ApiError::Unauthorized)
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::CredentialsRejected { status }
            | ApiError::RefreshRejected { status }
            | ApiError::Status { status, .. } => Some(*status),
            ApiError::Network(e) => e.status(),
            _ => None,
        }
    }
}
