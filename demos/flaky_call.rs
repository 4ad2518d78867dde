//! Circuit breaker demo around an always-failing operation.
//!
//! This example shows how to:
//! - Wrap a flaky operation with a circuit breaker
//! - Tell rejected calls apart from failed ones
//! - Watch the breaker recover through half-open
//!
//! Run with: cargo run --example flaky_call

use faultgate::operations::MockOperation;
use faultgate::prelude::*;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("faultgate=debug")),
        )
        .init();

    println!("=== Circuit Breaker Demo ===\n");

    let breaker = CircuitBreaker::new(3, Duration::from_secs(2))?;
    let operation = MockOperation::new().with_name("do-something").failing();

    for i in 1..=5 {
        let message = if breaker.attempt_call(|| operation.call()).is_closed() {
            "Called code successfully".to_string()
        } else {
            "too many fail attempts".to_string()
        };

        let detail = match breaker.last_attempt_outcome() {
            AttemptOutcome::Rejected => "rejected without running".to_string(),
            _ => breaker
                .last_attempt_error()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "ok".to_string()),
        };

        println!("Request #{i}: {message} ({detail})");
        println!("  Status: {}", breaker.status());
    }

    println!("\nWaiting for the open period to pass...");
    std::thread::sleep(Duration::from_millis(2100));
    println!("State after wait: {}", breaker.state());

    operation.set_failing(false);
    breaker.attempt_call(|| operation.call());
    println!("Probe succeeded, state: {}", breaker.state());
    println!("Operation ran {} times", operation.call_count());

    println!("\n=== Demo Complete ===");
    Ok(())
}
