//! Provider error types.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when talking to a provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The request never produced an HTTP response.
    #[error("request failed: {0}")]
    Transport(String),

    /// The provider answered with an unexpected HTTP status.
    #[error("HTTP {status}: {message}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// The response body or reason.
        message: String,
    },

    /// Authentication was rejected (HTTP 401/403).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The provider returned a rate-limit response (HTTP 429).
    #[error("rate limited")]
    RateLimited {
        /// Wait time suggested by the provider, in milliseconds.
        retry_after_ms: Option<u64>,
    },

    /// The call exceeded its timeout.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// The request was rejected before being sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The provider has not been configured (e.g. missing API key).
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    /// No client exists for the provider name.
    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// The response could not be parsed.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// How the retry policy treats an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Back off exponentially and resubmit.
    RateLimited,
    /// One extra attempt after a fixed delay.
    Transient,
    /// Surface immediately.
    Fatal,
}

impl ProviderError {
    /// Classifies the error for the retry policy.
    #[must_use]
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::RateLimited { .. } => RetryClass::RateLimited,
            Self::Transport(_) | Self::Status { .. } | Self::Timeout(_) => RetryClass::Transient,
            Self::AuthFailed(_)
            | Self::InvalidRequest(_)
            | Self::NotConfigured(_)
            | Self::UnsupportedProvider(_)
            | Self::InvalidResponse(_) => RetryClass::Fatal,
        }
    }

    /// Maps an HTTP status and body to an error.
    #[must_use]
    pub fn from_status(status: u16, body: impl Into<String>, retry_after_ms: Option<u64>) -> Self {
        match status {
            429 => Self::RateLimited { retry_after_ms },
            401 | 403 => Self::AuthFailed(body.into()),
            _ => Self::Status {
                status,
                message: body.into(),
            },
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidResponse(e.to_string())
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            Self::from_status(status.as_u16(), e.to_string(), None)
        } else {
            Self::Transport(e.to_string())
        }
    }
}
