//! Core types used throughout the faultgate library.
//!
//! This module defines the public vocabulary for breaker states, attempt
//! outcomes, and status snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The observable state of a circuit breaker.
///
/// This is a tag only; the data carried by each state lives in
/// [`BreakerState`](crate::circuit_breaker::BreakerState).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through and failures are counted.
    Closed,
    /// Calls are rejected without running until the timeout elapses.
    Open,
    /// Calls are let through to probe for recovery.
    HalfOpen,
}

impl CircuitState {
    /// Returns the name of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What happened on the most recent call attempt.
///
/// Lets a caller tell a call that was never admitted apart from one that ran
/// and failed, without the breaker raising anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// No attempt has been made yet, or one is in progress.
    #[default]
    NotAttempted,
    /// The operation ran and completed normally.
    Succeeded,
    /// The operation ran and returned an error.
    Failed,
    /// The call was fast-rejected; the operation did not run.
    Rejected,
}

impl AttemptOutcome {
    /// Returns `true` if the operation actually ran.
    pub fn was_admitted(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAttempted => write!(f, "not_attempted"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// A point-in-time snapshot of a breaker, suitable for logging or display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerStatus {
    /// Current state.
    pub state: CircuitState,

    /// Failures counted since the breaker last entered `Closed`.
    pub failure_count: u32,

    /// Failure count that trips the breaker open.
    pub failure_threshold: u32,

    /// How long the breaker stays open before probing, in milliseconds.
    pub open_duration_ms: u64,

    /// Outcome of the most recent attempt.
    pub last_outcome: AttemptOutcome,

    /// Wall-clock time the circuit opened, when open.
    pub opened_at: Option<DateTime<Utc>>,
}

impl BreakerStatus {
    /// Returns the configured open duration.
    pub fn open_duration(&self) -> Duration {
        Duration::from_millis(self.open_duration_ms)
    }
}

impl fmt::Display for BreakerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}/{} failures, last attempt {})",
            self.state, self.failure_count, self.failure_threshold, self.last_outcome
        )
    }
}
