use thiserror::Error;

/// Failure to evaluate an access strategy, as opposed to a denial.
///
/// Strategies that consult remote systems recover from these locally and deny;
/// the error is surfaced only through [`super::AccessStrategy::authorize_request`]
/// for callers that need to tell "denied" apart from "could not evaluate".
#[derive(Debug, Error)]
pub enum AccessStrategyError {
    #[error("Request to {endpoint} failed: {message}")]
    Transport { endpoint: String, message: String },

    #[error("Request to {endpoint} timed out after {timeout_ms}ms")]
    Timeout { endpoint: String, timeout_ms: u64 },

    #[error("Unexpected response from {endpoint}: {message}")]
    InvalidResponse { endpoint: String, message: String },

    #[error("Invalid access strategy configuration: {0}")]
    Configuration(String),
}

impl AccessStrategyError {
    pub fn transport(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn invalid_response(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub(crate) fn from_reqwest(endpoint: &str, timeout_ms: u64, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout {
                endpoint: endpoint.to_string(),
                timeout_ms,
            }
        } else {
            Self::transport(endpoint, error.to_string())
        }
    }
}
