//! Circuit breaker implementation for calls to unreliable operations.
//!
//! The circuit breaker pattern prevents cascading failures by temporarily
//! stopping traffic to a failing dependency and probing it again once a
//! timeout has passed.
//!
//! ## States
//!
//! - **Closed**: Normal operation; requests pass through.
//! - **Open**: Dependency is failing; requests are rejected immediately.
//! - **Half-Open**: Probing the dependency to see if it has recovered.
//!
//! ## Usage
//!
//! ```rust
//! use faultgate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! let config = CircuitBreakerConfig::default()
//!     .with_failure_threshold(5)
//!     .with_open_duration(Duration::from_secs(30));
//!
//! let breaker = CircuitBreaker::with_config(config).unwrap();
//! assert!(breaker.is_closed());
//! ```

mod breaker;
mod config;
mod state;

pub use breaker::{CircuitBreaker, SharedError};
pub use config::CircuitBreakerConfig;
pub use state::{BreakerState, Trigger};
