//! Sample operations to wrap with a breaker.
//!
//! - [`MockOperation`] - A call-counting operation that can be told to fail

mod mock;

pub use mock::{MockFailure, MockOperation};
