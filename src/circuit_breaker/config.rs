//! Circuit breaker configuration.

use crate::core::{BreakerError, BreakerResult};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a circuit breaker.
///
/// Values are checked by [`validate`](Self::validate) when a breaker is
/// built; they cannot change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Number of failures before opening the circuit.
    pub failure_threshold: u32,

    /// How long to keep the circuit open before transitioning to half-open.
    pub open_duration: Duration,

    /// Maximum number of calls admitted during one half-open period.
    ///
    /// `None` admits every call that arrives while half-open.
    pub half_open_max_probes: Option<u32>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(30),
            half_open_max_probes: None,
        }
    }
}

impl CircuitBreakerConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the failure threshold.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets the open duration.
    pub fn with_open_duration(mut self, duration: Duration) -> Self {
        self.open_duration = duration;
        self
    }

    /// Limits how many probes are admitted per half-open period.
    pub fn with_half_open_max_probes(mut self, max: u32) -> Self {
        self.half_open_max_probes = Some(max);
        self
    }

    /// Creates a configuration that allows a single in-flight probe.
    ///
    /// This configuration:
    /// - Opens after 3 failures
    /// - Stays open for 60 seconds
    /// - Admits one probe per half-open period
    pub fn single_probe() -> Self {
        Self {
            failure_threshold: 3,
            open_duration: Duration::from_secs(60),
            half_open_max_probes: Some(1),
        }
    }

    /// Checks that the configuration can drive a breaker.
    ///
    /// # Errors
    ///
    /// Returns [`BreakerError::InvalidConfiguration`] if the threshold is
    /// below 1, the open duration is zero, or the probe limit is zero.
    pub fn validate(&self) -> BreakerResult<()> {
        if self.failure_threshold < 1 {
            return Err(BreakerError::invalid_configuration(
                "failure_threshold",
                "threshold should be greater than 0",
            ));
        }

        if self.open_duration.is_zero() {
            return Err(BreakerError::invalid_configuration(
                "open_duration",
                "timeout should be greater than 0",
            ));
        }

        if self.half_open_max_probes == Some(0) {
            return Err(BreakerError::invalid_configuration(
                "half_open_max_probes",
                "probe limit should be greater than 0",
            ));
        }

        Ok(())
    }
}
