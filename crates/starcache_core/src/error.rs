//! Error types for the cache engine.

use thiserror::Error;

use starcache_provider::ProviderError;

/// Result type for cache engine operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in the cache engine.
///
/// Absence of a header or body is never an error; lookups return empty
/// collections or `None`.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// A provider operation failed or timed out. Recoverable; the index
    /// is left consistent and the manager keeps running.
    #[error("cache provider error: {0}")]
    Provider(#[from] ProviderError),

    /// An internal invariant was violated: an index access off the
    /// manager thread, or a lookup coordinate for a column the header
    /// does not constrain.
    #[error("invariant violation: {message}")]
    InvariantViolation {
        /// Description of the violated invariant.
        message: String,
    },

    /// The manager thread is gone; no further commands can be executed.
    #[error("cache manager is unavailable")]
    ManagerUnavailable,

    /// A rollup could not be built from the given inputs.
    #[error("rollup failed: {message}")]
    Rollup {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates an invariant violation error.
    pub fn invariant_violation(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }

    /// Creates a rollup error.
    pub fn rollup(message: impl Into<String>) -> Self {
        Self::Rollup {
            message: message.into(),
        }
    }
}
