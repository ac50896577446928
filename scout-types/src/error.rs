//! Error types shared by the scout crates.

use std::time::Duration;

/// Errors from talking to the search service.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    // Retryable errors
    /// Network-level error (connection reset, DNS failure, truncated body).
    #[error("network error: {0}")]
    Network(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// Request timed out.
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    /// The service answered with a 5xx status.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    // Terminal errors
    /// The session holds no token, so no authenticated request can be made.
    #[error("not authenticated")]
    Unauthenticated,
    /// The service rejected the bearer token (401/403).
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// The resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Malformed or rejected request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The response body could not be decoded.
    #[error("invalid response: {0}")]
    Decode(String),
    /// Reading a local file for upload failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The request was canceled through its cancellation token before a
    /// response arrived. Not a failure from the user's point of view.
    #[error("canceled")]
    Canceled,
}

impl ClientError {
    /// Whether this error is likely transient and the request can be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout(_) | Self::ServiceUnavailable(_)
        )
    }

    /// Whether this error only reports a cancellation.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}

/// Errors from provider/model selection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    /// The provider identifier is not one of the known backends.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    /// The model is not advertised for the selected provider.
    #[error("model {model} is not offered by {provider}")]
    UnknownModel {
        /// Currently selected provider.
        provider: String,
        /// The rejected model name.
        model: String,
    },
}
