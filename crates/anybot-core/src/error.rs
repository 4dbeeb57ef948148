//! Error types for the anybot gateway.
//!
//! Action errors are the only ones that reach handler code; event and auth
//! errors never leave the ingestion boundary.

use thiserror::Error;

// =============================================================================
// Action Errors
// =============================================================================

/// Errors returned by outbound action calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// No connected adapter could be selected for the action.
    #[error("no adapter connection available to route the action")]
    NotAvailable,

    /// The adapter answered with `status: "failed"`.
    #[error("action failed with retcode {retcode}")]
    ActionFailed {
        /// Return code reported by the adapter.
        retcode: i64,
    },

    /// No result arrived before the deadline.
    #[error("action call timed out")]
    Timeout,

    /// The frame could not be delivered to the adapter.
    #[error("network error: {0}")]
    Network(String),

    /// The synchronous facade was used before the gateway runtime exists.
    #[error("timing error: {0}")]
    Timing(String),

    /// Failed to serialize the request.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ApiError {
    /// Returns the adapter's retcode for [`ApiError::ActionFailed`].
    pub fn retcode(&self) -> Option<i64> {
        match self {
            Self::ActionFailed { retcode } => Some(*retcode),
            _ => None,
        }
    }

    /// Returns `true` for timeouts and transport failures.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Timeout | Self::Network(_))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// Event Errors
// =============================================================================

/// Errors raised while building an [`Event`](crate::Event) from a payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// A required key is absent or not a string.
    #[error("malformed event: missing `{0}`")]
    Malformed(&'static str),
}

// =============================================================================
// Authentication Errors
// =============================================================================

/// Errors raised while authenticating an inbound request or connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The credential header is absent or unreadable.
    #[error("credential is missing")]
    MissingCredential,

    /// The credential does not match the configured one.
    #[error("credential is invalid")]
    InvalidCredential,
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for action calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type for event construction.
pub type EventResult<T> = Result<T, EventError>;
