//! Audit event types and emission functions.

use crate::circuit_breaker::Trigger;
use crate::core::CircuitState;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Base trait for audit events.
pub trait AuditEvent: Serialize {
    /// Returns the event type name.
    fn event_type(&self) -> &'static str;

    /// Returns the timestamp of the event.
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Audit event for a breaker moving between states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransitionEvent {
    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,

    /// State the breaker left.
    pub from: CircuitState,

    /// State the breaker entered.
    pub to: CircuitState,

    /// What caused the transition.
    pub trigger: Trigger,

    /// Failure count at the moment of the transition, before any reset.
    pub failure_count: u32,

    /// Configured failure threshold.
    pub failure_threshold: u32,
}

impl AuditEvent for StateTransitionEvent {
    fn event_type(&self) -> &'static str {
        "state_transition"
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Emits an audit event for a state transition.
pub fn emit_state_transition(event: &StateTransitionEvent) {
    tracing::info!(
        target: "faultgate::audit",
        event_type = event.event_type(),
        timestamp = %event.timestamp,
        from = %event.from,
        to = %event.to,
        trigger = %event.trigger,
        failure_count = event.failure_count,
        failure_threshold = event.failure_threshold,
        "Circuit breaker state changed"
    );
}

/// Emits an audit event for a call rejected without running.
pub fn emit_call_rejected(state: CircuitState, failure_count: u32) {
    tracing::debug!(
        target: "faultgate::audit",
        event_type = "call_rejected",
        state = %state,
        failure_count = failure_count,
        "Call rejected by circuit breaker"
    );
}
