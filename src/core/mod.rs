//! Core types and traits for the faultgate library.
//!
//! - [`types`] - Breaker states, attempt outcomes, and status snapshots
//! - [`clock`] - The `Clock` abstraction and its system and mock clocks
//! - [`error`] - Structured error types

pub mod clock;
pub mod error;
pub mod types;

pub use clock::{Clock, MockClock, SystemClock};
pub use error::{BreakerError, BreakerResult, CallError, CallResult};
pub use types::{AttemptOutcome, BreakerStatus, CircuitState};
