//! Error types for stride-ai

use thiserror::Error;

/// Result type alias using stride-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when invoking a model
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned an error response
    #[error("API error: {message} (type: {error_type})")]
    Api { error_type: String, message: String },

    /// Rate limit exceeded
    #[error("Rate limited: retry after {retry_after:?} seconds")]
    RateLimited { retry_after: Option<u64> },

    /// Invalid API key
    #[error("Invalid or missing API key")]
    InvalidApiKey,

    /// Unexpected response format
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create an API error from type and message
    pub fn api(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Error::RateLimited { .. } => true,
            Error::Api {
                error_type,
                message,
            } => {
                let et = error_type.to_lowercase();
                let msg = message.to_lowercase();
                et.contains("rate_limit")
                    || et.contains("overloaded")
                    || msg.contains("rate limit")
                    || msg.contains("overloaded")
                    || msg.contains("too many requests")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_rate_limited() {
        assert!(Error::RateLimited { retry_after: Some(5) }.is_retryable());
    }

    #[test]
    fn test_retryable_api_overloaded() {
        assert!(Error::api("overloaded_error", "The server is overloaded").is_retryable());
        assert!(Error::api("error", "Too many requests").is_retryable());
    }

    #[test]
    fn test_not_retryable() {
        assert!(!Error::api("authentication_error", "Invalid API key").is_retryable());
        assert!(!Error::InvalidApiKey.is_retryable());
        assert!(!Error::UnexpectedResponse("no content".into()).is_retryable());
    }
}
