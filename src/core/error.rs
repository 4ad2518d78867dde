//! Error types for the faultgate library.
//!
//! Construction errors propagate to the caller. Errors raised by a protected
//! operation are captured by the breaker instead; they only surface through
//! [`CallError`] when the caller opts into [`execute`](crate::CircuitBreaker::execute).

use crate::core::types::CircuitState;

use std::sync::Arc;
use thiserror::Error;

/// Errors raised by the breaker itself.
#[derive(Debug, Error)]
pub enum BreakerError {
    /// The breaker was configured with values it cannot operate on.
    #[error("invalid configuration for '{field}': {message}")]
    InvalidConfiguration {
        /// Name of the offending setting.
        field: &'static str,
        /// Human-readable description of the problem.
        message: String,
    },
}

impl BreakerError {
    /// Creates an `InvalidConfiguration` error.
    pub fn invalid_configuration(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field,
            message: message.into(),
        }
    }

    /// Returns the name of the setting that failed validation.
    pub fn field(&self) -> &'static str {
        match self {
            Self::InvalidConfiguration { field, .. } => field,
        }
    }
}

/// Outcome of a protected call that did not produce a value.
///
/// Returned by [`execute`](crate::CircuitBreaker::execute) and
/// [`execute_async`](crate::CircuitBreaker::execute_async). The operation's
/// error is shared behind an [`Arc`] because the breaker keeps a handle to the
/// same value as its last-attempt error.
#[derive(Debug, Error)]
pub enum CallError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// The call was not admitted; the operation never ran.
    #[error("call rejected while circuit is {state}")]
    Rejected {
        /// State that rejected the call.
        state: CircuitState,
    },

    /// The operation ran and failed.
    #[error("protected operation failed: {source}")]
    Failed {
        /// The error returned by the operation, unchanged.
        #[source]
        source: Arc<E>,
    },
}

impl<E> CallError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Returns `true` if the call was fast-rejected.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    /// Returns the operation's error, if it ran and failed.
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            Self::Failed { source } => Some(source.as_ref()),
            Self::Rejected { .. } => None,
        }
    }
}

/// A specialized `Result` type for breaker construction.
pub type BreakerResult<T> = Result<T, BreakerError>;

/// A specialized `Result` type for value-returning protected calls.
pub type CallResult<T, E> = Result<T, CallError<E>>;
