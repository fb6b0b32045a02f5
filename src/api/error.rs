use thiserror::Error;

/// Errors from a backend round trip.
///
/// Callers never see these raw: the sync layer converts them into a
/// failed outcome and a user-facing notice. Every variant is recoverable.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// 5xx response
    #[error("Server error: status {0}")]
    Server(u16),
    /// 4xx response; `message` is the backend's reason text when it sent one
    #[error("{message}")]
    Rejected { status: u16, message: String },
    /// 429 after the retry budget was spent
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Body was not the JSON shape we expected
    #[error("Invalid response: {0}")]
    Decode(String),
    /// Base URL could not be parsed or extended
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// Refusing to send a bearer token over plain HTTP
    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
    /// The request task itself failed (panic)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// True for failures that may succeed when the user tries again.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Network(_)
            | ApiError::Timeout
            | ApiError::Server(_)
            | ApiError::RateLimited(_)
            | ApiError::Internal(_) => true,
            ApiError::Rejected { .. }
            | ApiError::ResponseTooLarge
            | ApiError::Decode(_)
            | ApiError::InvalidUrl(_)
            | ApiError::InsecureBaseUrl => false,
        }
    }

    /// HTTP status when the failure came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Server(status) | ApiError::Rejected { status, .. } => Some(*status),
            ApiError::RateLimited(_) => Some(429),
            _ => None,
        }
    }

    /// Short text for a dismissible notice.
    ///
    /// Rejections carry the backend's own wording; transport failures get a
    /// generic line so raw transport details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Rejected { message, .. } => message.clone(),
            ApiError::Timeout | ApiError::Network(_) => {
                "Network problem, please try again".to_string()
            }
            ApiError::Server(_) | ApiError::RateLimited(_) => {
                "Server is busy, please try again".to_string()
            }
            other => other.to_string(),
        }
    }
}
