//! Circuit breaker implementation.

use crate::audit::{self, StateTransitionEvent};
use crate::circuit_breaker::config::CircuitBreakerConfig;
use crate::circuit_breaker::state::{BreakerState, TransitionInput, Trigger};
use crate::core::{
    AttemptOutcome, BreakerResult, BreakerStatus, CallError, CallResult, CircuitState, Clock,
    SystemClock,
};

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// An error captured from a protected operation, shared with the caller.
///
/// The concrete type is preserved; use `downcast_ref` to get it back.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// A guard around calls to an unreliable operation.
///
/// The breaker counts failed calls and, once the failure threshold is
/// reached, rejects further calls without running them until the open
/// duration has passed. It then lets calls through as probes: one success
/// closes the circuit again, one failure reopens it.
///
/// # States
///
/// - **Closed**: Normal operation. Requests pass through, failures are counted.
/// - **Open**: Backend is failing. Requests are rejected immediately.
/// - **Half-Open**: Probing. Requests are allowed through to test whether the
///   backend has recovered.
///
/// # Locking
///
/// State and failure count sit behind one mutex. The protected operation runs
/// with no lock held, so admission and the outcome notification are two
/// separate critical sections and concurrent calls may interleave between
/// them. No background timer exists: an open circuit only notices that its
/// open duration elapsed when someone attempts a call or asks for its state.
///
/// # Example
///
/// ```rust
/// use faultgate::CircuitBreaker;
/// use std::time::Duration;
///
/// let breaker = CircuitBreaker::new(3, Duration::from_secs(30))?;
///
/// let closed = breaker
///     .attempt_call(|| std::fs::metadata("/definitely/not/here").map(|_| ()))
///     .is_closed();
///
/// assert!(closed);
/// assert_eq!(breaker.failure_count(), 1);
/// assert!(breaker.last_attempt_error().is_some());
/// # Ok::<(), faultgate::BreakerError>(())
/// ```
pub struct CircuitBreaker<C: Clock = SystemClock> {
    /// Validated configuration.
    config: CircuitBreakerConfig,
    /// Time source for open durations.
    clock: C,
    /// Current state and failure count.
    inner: Mutex<Inner>,
    /// Outcome of the most recent attempt.
    last_attempt: Mutex<LastAttempt>,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    failure_count: u32,
    /// Bumped on every transition; identifies the current sojourn.
    sojourn: u64,
}

/// A claim on a half-open probe slot, held while the probe runs.
///
/// Dropping it without [`settle`](Self::settle), because the future was
/// cancelled or the operation panicked, hands the slot back so the breaker
/// can admit another probe.
struct ProbeSlot<'a, C: Clock> {
    breaker: &'a CircuitBreaker<C>,
    /// Sojourn the slot was taken in; `None` once settled or for non-probes.
    sojourn: Option<u64>,
}

impl<C: Clock> ProbeSlot<'_, C> {
    fn settle(mut self) {
        self.sojourn = None;
    }
}

impl<C: Clock> Drop for ProbeSlot<'_, C> {
    fn drop(&mut self) {
        let Some(sojourn) = self.sojourn else {
            return;
        };

        let mut inner = self.breaker.lock_inner();
        if inner.sojourn == sojourn {
            inner.state.release_probe();
            tracing::debug!(sojourn, "Abandoned probe released its slot");
        }
    }
}

#[derive(Debug, Default)]
struct LastAttempt {
    outcome: AttemptOutcome,
    error: Option<SharedError>,
}

impl CircuitBreaker<SystemClock> {
    /// Creates a breaker that opens after `threshold` failures and stays open
    /// for `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`BreakerError::InvalidConfiguration`](crate::BreakerError::InvalidConfiguration)
    /// if `threshold` is 0 or `timeout` is zero.
    pub fn new(threshold: u32, timeout: Duration) -> BreakerResult<Self> {
        Self::with_config(
            CircuitBreakerConfig::new()
                .with_failure_threshold(threshold)
                .with_open_duration(timeout),
        )
    }

    /// Creates a breaker from a full configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BreakerError::InvalidConfiguration`](crate::BreakerError::InvalidConfiguration)
    /// if [`CircuitBreakerConfig::validate`] rejects `config`.
    pub fn with_config(config: CircuitBreakerConfig) -> BreakerResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Creates a breaker that reads time from `clock`.
    ///
    /// # Errors
    ///
    /// Returns [`BreakerError::InvalidConfiguration`](crate::BreakerError::InvalidConfiguration)
    /// if [`CircuitBreakerConfig::validate`] rejects `config`.
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> BreakerResult<Self> {
        config.validate()?;

        let state = BreakerState::enter(CircuitState::Closed, &clock);
        Ok(Self {
            config,
            clock,
            inner: Mutex::new(Inner {
                state,
                failure_count: 0,
                sojourn: 0,
            }),
            last_attempt: Mutex::new(LastAttempt::default()),
        })
    }

    /// Runs `operation` if the circuit admits it and records the outcome.
    ///
    /// Errors from `operation` are captured, not returned: check
    /// [`last_attempt_error`](Self::last_attempt_error) or the state queries
    /// afterwards. The operation's own value is discarded; use
    /// [`execute`](Self::execute) to keep it.
    pub fn attempt_call<F, T, E>(&self, operation: F) -> &Self
    where
        F: FnOnce() -> Result<T, E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let _ = self.execute(operation);
        self
    }

    /// Runs `operation` like [`attempt_call`](Self::attempt_call), but hands
    /// back its value or the reason it produced none.
    ///
    /// # Errors
    ///
    /// - [`CallError::Rejected`] if the circuit did not admit the call.
    /// - [`CallError::Failed`] if the operation returned an error. The same
    ///   error is also kept as the last-attempt error.
    pub fn execute<F, T, E>(&self, operation: F) -> CallResult<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.begin_attempt();
        let slot = match self.admit() {
            Ok(slot) => slot,
            Err(state) => {
                self.finish_attempt(AttemptOutcome::Rejected, None);
                return Err(CallError::Rejected { state });
            }
        };
        let result = operation();
        slot.settle();
        self.settle(result)
    }

    /// Async form of [`attempt_call`](Self::attempt_call).
    ///
    /// No lock is held while the operation's future is awaited.
    pub async fn attempt_call_async<F, Fut, T, E>(&self, operation: F) -> &Self
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let _ = self.execute_async(operation).await;
        self
    }

    /// Async form of [`execute`](Self::execute).
    ///
    /// Dropping the returned future while the operation is pending records
    /// no outcome; a half-open probe slot it held is given back.
    pub async fn execute_async<F, Fut, T, E>(&self, operation: F) -> CallResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.begin_attempt();
        let slot = match self.admit() {
            Ok(slot) => slot,
            Err(state) => {
                self.finish_attempt(AttemptOutcome::Rejected, None);
                return Err(CallError::Rejected { state });
            }
        };
        let result = operation().await;
        slot.settle();
        self.settle(result)
    }

    /// Returns the current state, first moving an expired open circuit to
    /// half-open.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock_inner();
        self.refresh(&mut inner);
        inner.state.kind()
    }

    /// Returns `true` if the circuit is closed. May move an expired open
    /// circuit to half-open first.
    pub fn is_closed(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    /// Returns `true` if the circuit is open. May move an expired open
    /// circuit to half-open first.
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Returns `true` if the circuit is half-open. May move an expired open
    /// circuit to half-open first.
    pub fn is_half_open(&self) -> bool {
        self.state() == CircuitState::HalfOpen
    }

    /// Returns a snapshot of the breaker after applying any due transition.
    ///
    /// State, failure count and last outcome are read under the state lock,
    /// so no outcome can be published between them.
    pub fn status(&self) -> BreakerStatus {
        let mut inner = self.lock_inner();
        self.refresh(&mut inner);

        BreakerStatus {
            state: inner.state.kind(),
            failure_count: inner.failure_count,
            failure_threshold: self.config.failure_threshold,
            open_duration_ms: u64::try_from(self.config.open_duration.as_millis())
                .unwrap_or(u64::MAX),
            last_outcome: self.last_attempt_outcome(),
            opened_at: inner.state.opened_at_utc(),
        }
    }

    /// Returns the number of failures counted since the circuit last closed.
    pub fn failure_count(&self) -> u32 {
        self.lock_inner().failure_count
    }

    /// Returns `true` once the failure count has reached the threshold.
    pub fn is_threshold_reached(&self) -> bool {
        self.failure_count() >= self.config.failure_threshold
    }

    /// Returns the error from the most recent attempt, if it failed.
    ///
    /// Cleared at the start of every attempt, so a successful or rejected
    /// call leaves `None` behind.
    pub fn last_attempt_error(&self) -> Option<SharedError> {
        self.lock_last_attempt().error.clone()
    }

    /// Returns what happened on the most recent attempt.
    pub fn last_attempt_outcome(&self) -> AttemptOutcome {
        self.lock_last_attempt().outcome
    }

    /// Forces the circuit into the open state with a fresh open time.
    pub fn force_open(&self) {
        let mut inner = self.lock_inner();
        self.apply(&mut inner, Trigger::ForceOpen);
    }

    /// Forces the circuit into the closed state, resetting the failure count.
    pub fn force_close(&self) {
        let mut inner = self.lock_inner();
        self.apply(&mut inner, Trigger::ForceClose);
    }

    /// Returns the failure threshold.
    pub fn threshold(&self) -> u32 {
        self.config.failure_threshold
    }

    /// Returns how long the circuit stays open before probing.
    pub fn timeout(&self) -> Duration {
        self.config.open_duration
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Returns a reference to the clock.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_last_attempt(&self) -> MutexGuard<'_, LastAttempt> {
        self.last_attempt
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin_attempt(&self) {
        *self.lock_last_attempt() = LastAttempt::default();
    }

    /// Publishes the outcome, then feeds it to the state machine, with both
    /// writes under the state lock.
    ///
    /// Lock order is state, then last attempt.
    fn finish_attempt(&self, outcome: AttemptOutcome, error: Option<SharedError>) {
        let mut inner = self.lock_inner();
        *self.lock_last_attempt() = LastAttempt { outcome, error };

        match outcome {
            AttemptOutcome::Succeeded => self.apply(&mut inner, Trigger::Success),
            AttemptOutcome::Failed => {
                inner.failure_count = inner.failure_count.saturating_add(1);
                self.apply(&mut inner, Trigger::Failure);
            }
            AttemptOutcome::NotAttempted | AttemptOutcome::Rejected => {}
        }
    }

    /// Checks if a request should be allowed through.
    fn admit(&self) -> Result<ProbeSlot<'_, C>, CircuitState> {
        let mut inner = self.lock_inner();
        self.refresh(&mut inner);

        let probe = inner.state.is_half_open();
        if inner.state.admit(self.config.half_open_max_probes) {
            Ok(ProbeSlot {
                breaker: self,
                sojourn: probe.then_some(inner.sojourn),
            })
        } else {
            let state = inner.state.kind();
            audit::emit_call_rejected(state, inner.failure_count);
            Err(state)
        }
    }

    /// Feeds the operation's result back into the state machine.
    fn settle<T, E>(&self, result: Result<T, E>) -> CallResult<T, E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        match result {
            Ok(value) => {
                self.finish_attempt(AttemptOutcome::Succeeded, None);
                Ok(value)
            }
            Err(e) => {
                tracing::debug!(error = %e, "Protected operation failed");
                let error = Arc::new(e);
                let shared: SharedError = error.clone();
                self.finish_attempt(AttemptOutcome::Failed, Some(shared));
                Err(CallError::Failed { source: error })
            }
        }
    }

    /// Applies a due open-to-half-open transition.
    fn refresh(&self, inner: &mut Inner) {
        self.apply(inner, Trigger::Check);
    }

    fn apply(&self, inner: &mut Inner, trigger: Trigger) {
        let input = TransitionInput {
            trigger,
            now: self.clock.now(),
            open_duration: self.config.open_duration,
            threshold_reached: inner.failure_count >= self.config.failure_threshold,
        };

        if let Some(target) = inner.state.next(input) {
            self.transition(inner, target, trigger);
        }
    }

    fn transition(&self, inner: &mut Inner, target: CircuitState, trigger: Trigger) {
        let event = StateTransitionEvent {
            timestamp: self.clock.utc_now(),
            from: inner.state.kind(),
            to: target,
            trigger,
            failure_count: inner.failure_count,
            failure_threshold: self.config.failure_threshold,
        };

        inner.state = BreakerState::enter(target, &self.clock);
        inner.sojourn = inner.sojourn.wrapping_add(1);
        if target == CircuitState::Closed {
            inner.failure_count = 0;
        }

        audit::emit_state_transition(&event);
    }
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock_inner();
        f.debug_struct("CircuitBreaker")
            .field("state", &inner.state)
            .field("failure_count", &inner.failure_count)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BreakerError, MockClock};
    use crate::operations::{MockFailure, MockOperation};

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn breaker(threshold: u32) -> (CircuitBreaker<MockClock>, MockClock) {
        let clock = MockClock::new();
        let config = CircuitBreakerConfig::new()
            .with_failure_threshold(threshold)
            .with_open_duration(TIMEOUT);
        let breaker = CircuitBreaker::with_clock(config, clock.clone()).unwrap();
        (breaker, clock)
    }

    fn trip(breaker: &CircuitBreaker<MockClock>) {
        let op = MockOperation::new().failing();
        for _ in 0..breaker.threshold() {
            breaker.attempt_call(|| op.call());
        }
        assert!(breaker.is_open());
    }

    #[test]
    fn test_invalid_configuration() {
        let err = CircuitBreaker::new(0, TIMEOUT).unwrap_err();
        assert!(matches!(
            err,
            BreakerError::InvalidConfiguration {
                field: "failure_threshold",
                ..
            }
        ));

        let err = CircuitBreaker::new(3, Duration::ZERO).unwrap_err();
        assert_eq!(err.field(), "open_duration");
    }

    #[test]
    fn test_fresh_breaker_is_closed() {
        let breaker = CircuitBreaker::new(3, TIMEOUT).unwrap();

        assert!(breaker.is_closed());
        assert!(!breaker.is_open());
        assert!(!breaker.is_half_open());
        assert_eq!(breaker.failure_count(), 0);
        assert!(!breaker.is_threshold_reached());
        assert!(breaker.last_attempt_error().is_none());
        assert_eq!(breaker.last_attempt_outcome(), AttemptOutcome::NotAttempted);
    }

    #[test]
    fn test_failures_below_threshold_stay_closed() {
        let (breaker, _clock) = breaker(5);
        let op = MockOperation::new().failing();

        for n in 1..5 {
            assert!(breaker.attempt_call(|| op.call()).is_closed());
            assert_eq!(breaker.failure_count(), n);
        }
        assert_eq!(op.call_count(), 4);
    }

    #[test]
    fn test_threshold_failure_opens_circuit() {
        let (breaker, _clock) = breaker(3);
        let op = MockOperation::new().failing();

        breaker.attempt_call(|| op.call());
        breaker.attempt_call(|| op.call());
        assert!(breaker.is_closed());

        assert!(breaker.attempt_call(|| op.call()).is_open());
        assert!(breaker.is_threshold_reached());
        assert_eq!(breaker.failure_count(), 3);
    }

    #[test]
    fn test_success_in_closed_keeps_failure_count() {
        let (breaker, _clock) = breaker(3);
        let failing = MockOperation::new().failing();
        let healthy = MockOperation::new();

        breaker.attempt_call(|| failing.call());
        breaker.attempt_call(|| healthy.call());
        assert_eq!(breaker.failure_count(), 1);

        breaker.attempt_call(|| failing.call());
        breaker.attempt_call(|| failing.call());
        assert!(breaker.is_open());
    }

    #[test]
    fn test_open_circuit_rejects_without_calling() {
        let (breaker, clock) = breaker(2);
        trip(&breaker);

        let op = MockOperation::new();
        clock.advance(TIMEOUT / 2);

        for _ in 0..5 {
            assert!(breaker.attempt_call(|| op.call()).is_open());
        }
        assert_eq!(op.call_count(), 0);
        assert_eq!(breaker.failure_count(), 2);
        assert_eq!(breaker.last_attempt_outcome(), AttemptOutcome::Rejected);
        assert!(breaker.last_attempt_error().is_none());
    }

    #[test]
    fn test_status_check_moves_to_half_open() {
        let (breaker, clock) = breaker(1);
        trip(&breaker);

        clock.advance(TIMEOUT);
        assert!(breaker.is_half_open());
        assert!(!breaker.is_open());
    }

    #[test]
    fn test_attempt_after_timeout_runs_probe() {
        let (breaker, clock) = breaker(1);
        trip(&breaker);

        let op = MockOperation::new().failing();
        clock.advance(TIMEOUT + Duration::from_millis(1));

        // No status check first: the attempt itself notices the timeout.
        breaker.attempt_call(|| op.call());
        assert_eq!(op.call_count(), 1);
        assert!(breaker.is_open());
    }

    #[test]
    fn test_half_open_success_closes() {
        let (breaker, clock) = breaker(2);
        trip(&breaker);
        clock.advance(TIMEOUT);

        let op = MockOperation::new();
        assert!(breaker.attempt_call(|| op.call()).is_closed());
        assert_eq!(breaker.failure_count(), 0);
        assert_eq!(breaker.last_attempt_outcome(), AttemptOutcome::Succeeded);
    }

    #[test]
    fn test_half_open_failure_reopens_below_threshold() {
        let (breaker, clock) = breaker(5);
        breaker.force_open();
        clock.advance(TIMEOUT);
        assert!(breaker.is_half_open());

        let op = MockOperation::new().failing();
        assert!(breaker.attempt_call(|| op.call()).is_open());
        assert_eq!(breaker.failure_count(), 1);
        assert!(!breaker.is_threshold_reached());

        // The reopened circuit starts a new open period.
        clock.advance(TIMEOUT / 2);
        assert!(breaker.is_open());
    }

    #[test]
    fn test_force_open_records_fresh_open_time() {
        let (breaker, clock) = breaker(3);
        breaker.force_open();

        clock.advance(TIMEOUT * 9 / 10);
        breaker.force_open();

        clock.advance(TIMEOUT / 2);
        assert!(breaker.is_open());

        clock.advance(TIMEOUT / 2);
        assert!(breaker.is_half_open());

        breaker.force_open();
        assert!(breaker.is_open());
        assert!(breaker.status().opened_at.is_some());
    }

    #[test]
    fn test_force_close_resets_failures() {
        let (breaker, clock) = breaker(2);

        let op = MockOperation::new().failing();
        breaker.attempt_call(|| op.call());
        breaker.force_close();
        assert!(breaker.is_closed());
        assert_eq!(breaker.failure_count(), 0);

        trip(&breaker);
        breaker.force_close();
        assert!(breaker.is_closed());
        assert_eq!(breaker.failure_count(), 0);

        trip(&breaker);
        clock.advance(TIMEOUT);
        assert!(breaker.is_half_open());
        breaker.force_close();
        assert!(breaker.is_closed());
    }

    #[test]
    fn test_last_attempt_error() {
        let (breaker, _clock) = breaker(3);
        let op = MockOperation::new().with_name("inventory").with_failures(1);

        breaker.attempt_call(|| op.call());
        let err = breaker.last_attempt_error().unwrap();
        let failure = err.downcast_ref::<MockFailure>().unwrap();
        assert_eq!(failure.name, "inventory");
        assert_eq!(failure.call, 1);
        assert_eq!(breaker.last_attempt_outcome(), AttemptOutcome::Failed);

        breaker.attempt_call(|| op.call());
        assert!(breaker.last_attempt_error().is_none());
        assert_eq!(breaker.last_attempt_outcome(), AttemptOutcome::Succeeded);
    }

    #[test]
    fn test_operation_value_is_discarded_by_attempt_call() {
        let (breaker, _clock) = breaker(3);
        let result = breaker
            .attempt_call(|| Ok::<_, MockFailure>(42))
            .is_closed();
        assert!(result);
    }

    #[test]
    fn test_execute_returns_value_or_reason() {
        let (breaker, _clock) = breaker(1);

        let value = breaker.execute(|| Ok::<_, MockFailure>("payload"));
        assert_eq!(value.unwrap(), "payload");

        let op = MockOperation::new().failing();
        let err = breaker.execute(|| op.call()).unwrap_err();
        assert_eq!(err.operation_error().map(|e| e.call), Some(1));
        assert!(breaker.last_attempt_error().is_some());

        let err = breaker.execute(|| op.call()).unwrap_err();
        assert!(matches!(
            err,
            CallError::Rejected {
                state: CircuitState::Open
            }
        ));
        assert_eq!(op.call_count(), 1);
    }

    #[test]
    fn test_concurrent_probes_admitted_by_default() {
        let (breaker, clock) = breaker(1);
        trip(&breaker);
        clock.advance(TIMEOUT);

        let inner_op = MockOperation::new();
        breaker.attempt_call(|| {
            // A second caller arrives while the first probe is in flight.
            breaker.attempt_call(|| inner_op.call());
            Ok::<_, MockFailure>(())
        });

        assert_eq!(inner_op.call_count(), 1);
        assert!(breaker.is_closed());
    }

    #[test]
    fn test_probe_limit_rejects_extra_probes() {
        let clock = MockClock::new();
        let config = CircuitBreakerConfig::new()
            .with_failure_threshold(1)
            .with_open_duration(TIMEOUT)
            .with_half_open_max_probes(1);
        let breaker = CircuitBreaker::with_clock(config, clock.clone()).unwrap();
        trip(&breaker);
        clock.advance(TIMEOUT);

        let inner_op = MockOperation::new();
        let mut inner_outcome = AttemptOutcome::NotAttempted;
        breaker.attempt_call(|| {
            inner_outcome = breaker
                .attempt_call(|| inner_op.call())
                .last_attempt_outcome();
            Ok::<_, MockFailure>(())
        });

        assert_eq!(inner_outcome, AttemptOutcome::Rejected);
        assert_eq!(inner_op.call_count(), 0);
        assert!(breaker.is_closed());
    }

    #[test]
    fn test_interleaved_probe_failure_wins() {
        let (breaker, clock) = breaker(1);
        trip(&breaker);
        clock.advance(TIMEOUT);

        let failing = MockOperation::new().failing();
        breaker.attempt_call(|| {
            breaker.attempt_call(|| failing.call());
            Ok::<_, MockFailure>(())
        });

        // The outer probe's success lands on the reopened circuit and is ignored.
        assert!(breaker.is_open());
        assert_eq!(breaker.failure_count(), 2);
    }

    #[test]
    fn test_concurrent_failures_are_all_counted() {
        let clock = MockClock::new();
        let config = CircuitBreakerConfig::new()
            .with_failure_threshold(1_000)
            .with_open_duration(TIMEOUT);
        let breaker = Arc::new(CircuitBreaker::with_clock(config, clock).unwrap());
        let op = Arc::new(MockOperation::new().failing());

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let breaker = Arc::clone(&breaker);
                let op = Arc::clone(&op);
                scope.spawn(move || {
                    for _ in 0..25 {
                        breaker.attempt_call(|| op.call());
                    }
                });
            }
        });

        assert_eq!(breaker.failure_count(), 200);
        assert_eq!(op.call_count(), 200);
        assert!(breaker.is_closed());
    }

    #[test]
    fn test_end_to_end_recovery() {
        let (breaker, clock) = breaker(3);
        let op = MockOperation::new().failing();

        breaker.attempt_call(|| op.call());
        breaker.attempt_call(|| op.call());
        assert!(breaker.attempt_call(|| op.call()).is_open());
        assert_eq!(op.call_count(), 3);

        clock.advance(Duration::from_millis(500));
        assert!(breaker.is_open());
        breaker.attempt_call(|| op.call());
        assert_eq!(op.call_count(), 3);

        clock.advance(Duration::from_millis(500));
        op.set_failing(false);
        assert!(breaker.is_half_open());
        assert!(breaker.attempt_call(|| op.call()).is_closed());
        assert_eq!(op.call_count(), 4);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[test]
    fn test_status_snapshot() {
        let (breaker, _clock) = breaker(2);
        let status = breaker.status();
        assert_eq!(status.state, CircuitState::Closed);
        assert_eq!(status.failure_threshold, 2);
        assert_eq!(status.open_duration(), TIMEOUT);
        assert!(status.opened_at.is_none());

        trip(&breaker);
        let status = breaker.status();
        assert_eq!(status.state, CircuitState::Open);
        assert_eq!(status.failure_count, 2);
        assert_eq!(status.last_outcome, AttemptOutcome::Failed);
        assert!(status.opened_at.is_some());

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "open");
    }

    fn single_probe_breaker() -> (CircuitBreaker<MockClock>, MockClock) {
        let clock = MockClock::new();
        let config = CircuitBreakerConfig::new()
            .with_failure_threshold(1)
            .with_open_duration(TIMEOUT)
            .with_half_open_max_probes(1);
        let breaker = CircuitBreaker::with_clock(config, clock.clone()).unwrap();
        trip(&breaker);
        clock.advance(TIMEOUT);
        (breaker, clock)
    }

    #[test]
    fn test_panicking_call_frees_half_open_slot() {
        let (breaker, _clock) = single_probe_breaker();

        let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            breaker.attempt_call(|| -> Result<(), MockFailure> { panic!("operation blew up") });
        }));
        assert!(unwound.is_err());
        assert!(breaker.is_half_open());

        let op = MockOperation::new();
        assert!(breaker.attempt_call(|| op.call()).is_closed());
        assert_eq!(op.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_call_frees_half_open_slot() {
        let (breaker, _clock) = single_probe_breaker();

        let timed_out = tokio::time::timeout(
            Duration::from_millis(10),
            breaker.execute_async(|| std::future::pending::<Result<(), MockFailure>>()),
        )
        .await;
        assert!(timed_out.is_err());
        assert!(breaker.is_half_open());
        assert_eq!(breaker.last_attempt_outcome(), AttemptOutcome::NotAttempted);

        let op = MockOperation::new();
        assert!(breaker.attempt_call_async(|| op.call_async()).await.is_closed());
        assert_eq!(op.call_count(), 1);
        assert_eq!(breaker.last_attempt_outcome(), AttemptOutcome::Succeeded);
    }

    #[tokio::test]
    async fn test_stale_slot_does_not_free_next_half_open_period() {
        let (breaker, clock) = single_probe_breaker();
        let op = MockOperation::new();

        let mut stale = Box::pin(
            breaker.execute_async(|| std::future::pending::<Result<(), MockFailure>>()),
        );
        assert!(tokio::time::timeout(Duration::from_millis(1), &mut stale)
            .await
            .is_err());

        // The circuit reopens and half-opens again while the first call hangs.
        breaker.force_open();
        clock.advance(TIMEOUT);
        assert!(breaker.is_half_open());

        let mut current = Box::pin(
            breaker.execute_async(|| std::future::pending::<Result<(), MockFailure>>()),
        );
        assert!(tokio::time::timeout(Duration::from_millis(1), &mut current)
            .await
            .is_err());

        drop(stale);
        let err = breaker.execute(|| op.call()).unwrap_err();
        assert!(matches!(
            err,
            CallError::Rejected {
                state: CircuitState::HalfOpen
            }
        ));
        assert_eq!(op.call_count(), 0);

        drop(current);
        assert!(breaker.attempt_call(|| op.call()).is_closed());
        assert_eq!(op.call_count(), 1);
    }

    #[test]
    fn test_status_never_shows_failure_without_count() {
        let config = CircuitBreakerConfig::new()
            .with_failure_threshold(1_000)
            .with_open_duration(TIMEOUT);
        let breaker = CircuitBreaker::with_clock(config, MockClock::new()).unwrap();
        let failing = MockOperation::new().failing();
        let healthy = MockOperation::new();
        let done = std::sync::atomic::AtomicBool::new(false);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                while !done.load(std::sync::atomic::Ordering::SeqCst) {
                    let status = breaker.status();
                    assert!(
                        status.last_outcome != AttemptOutcome::Failed || status.failure_count > 0,
                        "inconsistent snapshot: {status}"
                    );
                }
            });

            for _ in 0..500 {
                breaker.attempt_call(|| healthy.call());
                breaker.force_close();
                breaker.attempt_call(|| failing.call());
            }
            done.store(true, std::sync::atomic::Ordering::SeqCst);
        });

        assert_eq!(breaker.last_attempt_outcome(), AttemptOutcome::Failed);
        assert_eq!(breaker.failure_count(), 1);
    }

    #[tokio::test]
    async fn test_async_calls_follow_same_transitions() {
        let (breaker, clock) = breaker(2);
        let op = MockOperation::new().failing();

        breaker.attempt_call_async(|| op.call_async()).await;
        assert!(breaker.attempt_call_async(|| op.call_async()).await.is_open());

        let err = breaker
            .execute_async(|| op.call_async())
            .await
            .unwrap_err();
        assert!(err.is_rejected());
        assert_eq!(op.call_count(), 2);

        clock.advance(TIMEOUT);
        op.set_failing(false);
        let value = breaker
            .execute_async(|| async { op.call_async().await.map(|()| "recovered") })
            .await
            .unwrap();
        assert_eq!(value, "recovered");
        assert!(breaker.is_closed());
    }

    #[tokio::test]
    async fn test_shared_breaker_across_tasks() {
        let breaker = Arc::new(CircuitBreaker::new(3, Duration::from_secs(60)).unwrap());
        let op = Arc::new(MockOperation::new().failing());

        let mut handles = Vec::new();
        for _ in 0..3 {
            let breaker = Arc::clone(&breaker);
            let op = Arc::clone(&op);
            handles.push(tokio::spawn(async move {
                breaker.attempt_call_async(|| op.call_async()).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(breaker.is_open());
        assert_eq!(op.call_count(), 3);
    }
}
