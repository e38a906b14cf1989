//! Reasoning engine error types

use thiserror::Error;

/// Errors raised while streaming a turn from the hosted model
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Rate limited by the model API: {message}")]
    RateLimited { message: String },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Response blocked: {reason}")]
    Blocked { reason: String },

    #[error("Gave up after {0} tool rounds without a final answer")]
    ToolRoundsExceeded(u32),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether sending the same turn again could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::RateLimited { .. } => true,
            EngineError::ApiError { status, .. } => *status >= 500,
            EngineError::Network(_) | EngineError::Stream(_) => true,
            EngineError::InvalidResponse(_)
            | EngineError::Blocked { .. }
            | EngineError::ToolRoundsExceeded(_)
            | EngineError::Json(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(
            EngineError::RateLimited {
                message: "quota".to_string()
            }
            .is_retryable()
        );

        assert!(
            EngineError::ApiError {
                status: 503,
                message: "Unavailable".to_string()
            }
            .is_retryable()
        );

        // 4xx errors should not be retryable
        assert!(
            !EngineError::ApiError {
                status: 400,
                message: "Bad request".to_string()
            }
            .is_retryable()
        );

        assert!(!EngineError::ToolRoundsExceeded(10).is_retryable());
    }

    #[test]
    fn test_display() {
        let err = EngineError::ApiError {
            status: 403,
            message: "API key not valid".to_string(),
        };
        assert_eq!(err.to_string(), "API error 403: API key not valid");
    }
}
