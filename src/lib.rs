//! # Faultgate
//!
//! A circuit breaker for wrapping calls to remote or flaky operations.
//!
//! ## Overview
//!
//! A [`CircuitBreaker`] counts failed calls. Once the failure threshold is
//! reached it opens and rejects further calls without running them, giving
//! the failing dependency time to recover. After the configured timeout the
//! next caller is let through as a probe: success closes the circuit, failure
//! opens it again.
//!
//! The breaker never raises for an open circuit and never rethrows an
//! operation's error from [`attempt_call`](CircuitBreaker::attempt_call).
//! Callers learn what happened from the state queries and the last-attempt
//! error and outcome.
//!
//! ## Quick Start
//!
//! ```rust
//! use faultgate::CircuitBreaker;
//! use faultgate::operations::MockOperation;
//! use std::time::Duration;
//!
//! let breaker = CircuitBreaker::new(3, Duration::from_secs(15))?;
//! let operation = MockOperation::new().failing();
//!
//! for _ in 0..3 {
//!     if breaker.attempt_call(|| operation.call()).is_closed() {
//!         println!("Called code successfully");
//!     } else {
//!         println!("Too many failed attempts");
//!     }
//! }
//!
//! assert!(breaker.is_open());
//! # Ok::<(), faultgate::BreakerError>(())
//! ```
//!
//! ## Features
//!
//! - `default` - Includes tokio runtime support
//! - `tokio-runtime` - Async latency simulation in [`operations::MockOperation`]
//!
//! ## Architecture
//!
//! - **Core**: States, status snapshots, clocks, and error types
//! - **Circuit Breaker**: The state machine and the lock-guarded shell
//! - **Audit**: Structured `tracing` events for state changes
//! - **Operations**: A mock operation for tests and demos

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod audit;
pub mod circuit_breaker;
pub mod core;
pub mod operations;

// Re-export commonly used types at the crate root
pub use crate::core::{
    AttemptOutcome, BreakerError, BreakerResult, BreakerStatus, CallError, CallResult,
    CircuitState, Clock, MockClock, SystemClock,
};

pub use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, SharedError};

/// Prelude module for convenient imports.
///
/// ```rust
/// use faultgate::prelude::*;
/// ```
pub mod prelude {
    pub use crate::core::{
        AttemptOutcome, BreakerError, BreakerStatus, CallError, CircuitState, Clock, SystemClock,
    };
    pub use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
}
