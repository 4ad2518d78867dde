//! Circuit breaker state machine.
//!
//! Each variant of [`BreakerState`] is one sojourn in a state. A transition
//! never edits the current value into another variant; the breaker builds a
//! fresh value with [`BreakerState::enter`] and drops the old one, so entry
//! actions run exactly once per entry.
//!
//! ```text
//! Closed   --failure, threshold reached-->  Open
//! Open     --check, open duration elapsed--> HalfOpen
//! HalfOpen --success-->                      Closed
//! HalfOpen --failure-->                      Open
//! any      --force_open / force_close-->     Open / Closed
//! ```

use crate::core::{CircuitState, Clock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// The current state of a circuit breaker, with the data it was entered with.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BreakerState {
    /// Circuit is closed; requests pass through normally.
    #[default]
    Closed,

    /// Circuit is open; requests are rejected.
    Open {
        /// When the circuit was opened, on the monotonic clock.
        opened_at: Instant,
        /// When the circuit was opened, on the wall clock.
        opened_at_utc: DateTime<Utc>,
    },

    /// Circuit is half-open; allowing probe requests through.
    HalfOpen {
        /// Probe requests admitted during this half-open period that have
        /// neither settled nor been abandoned.
        probes_in_flight: u32,
    },
}

/// An event fed to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// An admission or status check; lets an open circuit notice its timeout.
    #[serde(rename = "timeout_elapsed")]
    Check,
    /// A protected call completed normally.
    Success,
    /// A protected call failed.
    Failure,
    /// An administrator forced the circuit open.
    ForceOpen,
    /// An administrator forced the circuit closed.
    ForceClose,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Check => write!(f, "timeout_elapsed"),
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::ForceOpen => write!(f, "force_open"),
            Self::ForceClose => write!(f, "force_close"),
        }
    }
}

/// Facts the state machine needs beyond its own data.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TransitionInput {
    pub trigger: Trigger,
    pub now: Instant,
    pub open_duration: Duration,
    pub threshold_reached: bool,
}

impl BreakerState {
    /// Builds the value for a fresh sojourn in `state`.
    ///
    /// Resetting the failure count is the caller's half of entering
    /// `Closed`; this only records what the new state itself carries.
    pub fn enter<C: Clock + ?Sized>(state: CircuitState, clock: &C) -> Self {
        match state {
            CircuitState::Closed => Self::Closed,
            CircuitState::Open => Self::Open {
                opened_at: clock.now(),
                opened_at_utc: clock.utc_now(),
            },
            CircuitState::HalfOpen => Self::HalfOpen { probes_in_flight: 0 },
        }
    }

    /// Returns the tag of this state.
    pub fn kind(&self) -> CircuitState {
        match self {
            Self::Closed => CircuitState::Closed,
            Self::Open { .. } => CircuitState::Open,
            Self::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    /// Returns `true` if the circuit is closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns `true` if the circuit is open.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// Returns `true` if the circuit is half-open.
    pub fn is_half_open(&self) -> bool {
        matches!(self, Self::HalfOpen { .. })
    }

    /// Returns the wall-clock time the circuit opened, if open.
    pub fn opened_at_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Open { opened_at_utc, .. } => Some(*opened_at_utc),
            _ => None,
        }
    }

    /// Returns the state to move to in response to `input`, if any.
    pub(crate) fn next(&self, input: TransitionInput) -> Option<CircuitState> {
        match (self, input.trigger) {
            (_, Trigger::ForceOpen) => Some(CircuitState::Open),
            (_, Trigger::ForceClose) => Some(CircuitState::Closed),

            (Self::Closed, Trigger::Failure) if input.threshold_reached => {
                Some(CircuitState::Open)
            }
            (Self::Closed, Trigger::Check | Trigger::Success | Trigger::Failure) => None,

            (Self::Open { opened_at, .. }, Trigger::Check) => {
                if input.now.saturating_duration_since(*opened_at) >= input.open_duration {
                    Some(CircuitState::HalfOpen)
                } else {
                    None
                }
            }
            // Outcomes of calls admitted before the circuit opened.
            (Self::Open { .. }, Trigger::Success | Trigger::Failure) => None,

            (Self::HalfOpen { .. }, Trigger::Check) => None,
            (Self::HalfOpen { .. }, Trigger::Success) => Some(CircuitState::Closed),
            (Self::HalfOpen { .. }, Trigger::Failure) => Some(CircuitState::Open),
        }
    }

    /// Decides whether a call may run, counting it if it is a probe.
    ///
    /// Must be called after any due time-based transition has been applied.
    pub(crate) fn admit(&mut self, max_probes: Option<u32>) -> bool {
        match self {
            Self::Closed => true,
            Self::Open { .. } => false,
            Self::HalfOpen { probes_in_flight } => {
                if max_probes.is_some_and(|max| *probes_in_flight >= max) {
                    return false;
                }
                *probes_in_flight = probes_in_flight.saturating_add(1);
                true
            }
        }
    }

    /// Gives back a probe slot whose call ended without an outcome.
    pub(crate) fn release_probe(&mut self) {
        if let Self::HalfOpen { probes_in_flight } = self {
            *probes_in_flight = probes_in_flight.saturating_sub(1);
        }
    }
}
