//! Reusable building blocks shared across HubRelay crates.
//!
//! # Feature Tiers
//!
//! - `runtime`: async resilience primitives (circuit breaker, retry)

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod resilience;

#[cfg(feature = "runtime")]
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, Clock, MockClock, RetryConfig,
    RetryExecutor, SystemClock,
};
