//! Resilience patterns for outbound calls
//!
//! - **Circuit Breaker**: count-based sliding window, failure-rate threshold,
//!   timed OPEN state and a bounded HALF_OPEN probe phase
//! - **Retry**: bounded attempts with fixed or exponential backoff, driven by
//!   a caller-supplied [`RetryPolicy`]
//!
//! Both are generic over the protected operation's error type. Composition
//! (which layer wraps which, and how errors are classified) is left to the
//! caller.

pub mod circuit_breaker;
pub mod retry;

// Re-export circuit breaker types
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerBuilderWithClock, CircuitBreakerConfig,
    CircuitBreakerConfigBuilder, CircuitBreakerMetrics, CircuitState, Clock, ConfigError,
    ConfigResult, MockClock, ResilienceError, ResilienceResult, StateTransition, SystemClock,
};
// Re-export retry types
pub use retry::{
    BackoffStrategy, RetryConfig, RetryConfigBuilder, RetryDecision, RetryError, RetryExecutor,
    RetryOutcome, RetryPolicy, RetryResult,
};
