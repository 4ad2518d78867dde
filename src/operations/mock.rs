//! Mock operation for testing.
//!
//! This module provides a configurable flaky operation that can be wrapped
//! by a breaker in tests and demos without a real remote dependency.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

/// The error returned by a failing [`MockOperation`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("operation '{name}' failed on call {call}")]
pub struct MockFailure {
    /// Name of the operation that failed.
    pub name: String,
    /// 1-based number of the call that failed.
    pub call: u64,
}

/// A mock operation for testing purposes.
///
/// The operation counts every invocation, which makes it easy to check that
/// an open breaker never ran it.
///
/// # Examples
///
/// ```rust
/// use faultgate::operations::MockOperation;
///
/// let op = MockOperation::new().failing();
/// assert!(op.call().is_err());
///
/// op.set_failing(false);
/// assert!(op.call().is_ok());
/// assert_eq!(op.call_count(), 2);
/// ```
#[derive(Debug)]
pub struct MockOperation {
    /// Name of this operation instance.
    name: String,
    /// Whether calls currently fail.
    failing: AtomicBool,
    /// Calls that fail before `failing` is consulted.
    failures_remaining: AtomicU64,
    /// Simulated latency for calls.
    latency: Option<Duration>,
    /// Counter for invocations.
    call_count: AtomicU64,
}

impl MockOperation {
    /// Creates a mock operation that succeeds.
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            failing: AtomicBool::new(false),
            failures_remaining: AtomicU64::new(0),
            latency: None,
            call_count: AtomicU64::new(0),
        }
    }

    /// Sets the name of this operation.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Makes every call fail until [`set_failing`](Self::set_failing) says otherwise.
    pub fn failing(self) -> Self {
        self.failing.store(true, Ordering::SeqCst);
        self
    }

    /// Makes the next `count` calls fail, then falls back to the failing flag.
    pub fn with_failures(self, count: u64) -> Self {
        self.failures_remaining.store(count, Ordering::SeqCst);
        self
    }

    /// Sets the simulated latency for calls.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Switches failure on or off.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Returns the number of times the operation ran.
    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Returns the name of this operation.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the operation, blocking for the configured latency.
    pub fn call(&self) -> Result<(), MockFailure> {
        let call = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }
        self.outcome(call)
    }

    /// Runs the operation, awaiting the configured latency.
    pub async fn call_async(&self) -> Result<(), MockFailure> {
        let call = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(latency) = self.latency {
            #[cfg(feature = "tokio-runtime")]
            tokio::time::sleep(latency).await;
            #[cfg(not(feature = "tokio-runtime"))]
            std::thread::sleep(latency);
        }
        self.outcome(call)
    }

    fn outcome(&self, call: u64) -> Result<(), MockFailure> {
        let scripted = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        if scripted || self.failing.load(Ordering::SeqCst) {
            return Err(MockFailure {
                name: self.name.clone(),
                call,
            });
        }
        Ok(())
    }
}

impl Default for MockOperation {
    fn default() -> Self {
        Self::new()
    }
}
