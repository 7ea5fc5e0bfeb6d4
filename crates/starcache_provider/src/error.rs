//! Error types for provider operations.

use std::time::Duration;

use thiserror::Error;

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors that can occur talking to an external cache provider.
///
/// Absence of a header or body is never an error; it is an `Ok(None)` or
/// `Ok(false)` result. Every variant here is recoverable from the
/// manager's point of view.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The operation did not complete within its budget. The underlying
    /// work is not cancelled; the provider releases its own resources.
    #[error("cache {operation} timed out after {budget:?}")]
    Timeout {
        /// Which operation timed out (read, lookup, write, scan).
        operation: &'static str,
        /// The configured budget that was exceeded.
        budget: Duration,
    },

    /// The provider failed in an unexpected way.
    #[error("cache provider failure: {message}")]
    Failed {
        /// Description of the failure.
        message: String,
    },

    /// A header or body refused to round-trip through the provider's
    /// serialization.
    #[error("cache serialization failure: {message}")]
    Serialization {
        /// Description of the failure.
        message: String,
    },

    /// The provider has been torn down; no further operations succeed.
    #[error("cache provider is torn down")]
    TornDown,

    /// No registered provider matches the configured name.
    #[error("unknown cache provider: {name}")]
    UnknownProvider {
        /// The name that failed to resolve.
        name: String,
    },
}

impl ProviderError {
    /// Creates a generic provider failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Creates a serialization failure.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Returns true for timeouts.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
