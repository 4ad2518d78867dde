//! Structured audit logging for breaker state changes.
//!
//! This module emits structured events through the `tracing` crate under the
//! `faultgate::audit` target. Any tracing subscriber can capture them.

mod events;

pub use events::{emit_call_rejected, emit_state_transition, AuditEvent, StateTransitionEvent};
