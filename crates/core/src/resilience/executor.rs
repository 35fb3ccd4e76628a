//! Resilient executor: retry around a primary circuit breaker around a
//! half-open-stability breaker.
//!
//! Every outbound hub call runs as `Retry(Primary(Stability(operation)))`.
//! A breaker rejection counts as a failed attempt, so an open circuit still
//! consumes the retry budget without reaching the network.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hubrelay_common::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState, Clock, ConfigResult,
    RetryConfig, RetryDecision, RetryError, RetryExecutor, RetryPolicy, SystemClock,
};
use hubrelay_domain::{
    BackoffKind, CircuitBreakerSettings, DispatchResult, HubRelayError, ResilienceConfig,
    Result, RetrySettings,
};
use tracing::{debug, info, warn};

use crate::hub::{classify, HubError};

/// Name of the outer breaker.
pub const PRIMARY_BREAKER: &str = "circuitBreaker";
/// Name of the inner breaker that watches half-open recovery.
pub const STABILITY_BREAKER: &str = "circuitBreakerHalfOpen";

/// Retries the failure kinds the hub is expected to recover from.
#[derive(Debug, Clone, Default)]
pub struct HubRetryPolicy {
    additional_retryable_statuses: Vec<u16>,
}

impl HubRetryPolicy {
    pub const fn new(additional_retryable_statuses: Vec<u16>) -> Self {
        Self { additional_retryable_statuses }
    }
}

impl RetryPolicy<HubError> for HubRetryPolicy {
    fn should_retry(&self, error: &HubError, _attempt: u32) -> RetryDecision {
        if classify(error).is_retryable(&self.additional_retryable_statuses) {
            RetryDecision::Retry
        } else {
            RetryDecision::Stop
        }
    }
}

/// Runs hub operations under retry and both circuit breakers.
#[derive(Debug, Clone)]
pub struct ResilientExecutor<C: Clock = SystemClock> {
    retry: RetryExecutor<HubRetryPolicy>,
    primary: CircuitBreaker<C>,
    stability: CircuitBreaker<C>,
    half_open_failures: Arc<AtomicU32>,
}

impl ResilientExecutor<SystemClock> {
    /// Build from configuration using the system clock.
    pub fn from_settings(settings: &ResilienceConfig) -> Result<Self> {
        Self::with_clock(settings, SystemClock)
    }
}

impl<C: Clock + Clone> ResilientExecutor<C> {
    /// Build from configuration with an injected clock shared by both breakers.
    pub fn with_clock(settings: &ResilienceConfig, clock: C) -> Result<Self> {
        let retry = RetryExecutor::new(
            retry_config(&settings.retry).map_err(config_error)?,
            HubRetryPolicy::new(settings.retry.additional_retryable_statuses.clone()),
        );
        let primary = CircuitBreaker::with_clock(
            breaker_config(PRIMARY_BREAKER, &settings.circuit_breaker).map_err(config_error)?,
            clock.clone(),
        )
        .map_err(config_error)?;
        let stability = CircuitBreaker::with_clock(
            breaker_config(STABILITY_BREAKER, &settings.half_open_stability)
                .map_err(config_error)?,
            clock,
        )
        .map_err(config_error)?;

        let executor =
            Self { retry, primary, stability, half_open_failures: Arc::new(AtomicU32::new(0)) };
        executor.register_listeners();
        Ok(executor)
    }
}

impl<C: Clock> ResilientExecutor<C> {
    /// Run `operation` under retry and both breakers.
    ///
    /// Returns the classified error of the last attempt when every attempt
    /// failed or the error was not retryable.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> std::result::Result<T, HubError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, HubError>>,
    {
        let operation = &operation;
        self.retry
            .execute(move || async move {
                let half_open = self.primary.state() == CircuitState::HalfOpen;
                let result = self
                    .primary
                    .execute(|| async move {
                        self.stability.execute(operation).await.map_err(HubError::from)
                    })
                    .await
                    .map_err(HubError::from);

                if half_open && result.is_err() {
                    self.half_open_failures.fetch_add(1, Ordering::SeqCst);
                }
                result
            })
            .await
            .map_err(RetryError::into_inner)
    }

    /// Run a dispatch operation and fold any terminal failure into a
    /// [`DispatchResult`] with id `-1`.
    pub async fn execute_generic_handling<F, Fut>(&self, operation: F) -> DispatchResult
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<DispatchResult, HubError>>,
    {
        match self.execute(operation).await {
            Ok(result) => result,
            Err(error) => {
                let kind = classify(&error);
                warn!(
                    failure_kind = ?kind,
                    error = %error,
                    "Operation failed after retries"
                );
                DispatchResult::failure(kind.status_code(), error.to_string())
            }
        }
    }

    pub fn primary_state(&self) -> CircuitState {
        self.primary.state()
    }

    pub fn stability_state(&self) -> CircuitState {
        self.stability.state()
    }

    pub fn primary_metrics(&self) -> CircuitBreakerMetrics {
        self.primary.metrics()
    }

    pub fn stability_metrics(&self) -> CircuitBreakerMetrics {
        self.stability.metrics()
    }

    /// Failures seen since the primary breaker last entered HALF_OPEN.
    pub fn half_open_failures(&self) -> u32 {
        self.half_open_failures.load(Ordering::SeqCst)
    }

    fn register_listeners(&self) {
        let wait_secs = self.primary.config().wait_duration_in_open_state.as_secs();
        let failures = Arc::clone(&self.half_open_failures);
        self.primary.on_transition(move |transition| match transition.to {
            CircuitState::Open => {
                warn!(
                    breaker = %transition.breaker,
                    from = %transition.from,
                    "Circuit opened for {wait_secs} seconds due to failures."
                );
            }
            CircuitState::HalfOpen => {
                failures.store(0, Ordering::SeqCst);
                info!(
                    breaker = %transition.breaker,
                    "Circuit in Half-Open state, testing connectivity..."
                );
            }
            CircuitState::Closed => {
                failures.store(0, Ordering::SeqCst);
                info!(breaker = %transition.breaker, "Circuit closed again, operating normally.");
            }
        });

        let failures = Arc::clone(&self.half_open_failures);
        self.stability.on_transition(move |transition| {
            if transition.from != CircuitState::Open {
                return;
            }
            let count = failures.load(Ordering::SeqCst);
            if count == 0 {
                debug!(
                    breaker = %transition.breaker,
                    to = %transition.to,
                    "stability breaker left open state"
                );
                return;
            }
            warn!(
                breaker = %transition.breaker,
                half_open_failures = count,
                "Half-Open circuit failed {count} times and will be reopened."
            );
        });
    }
}

fn config_error(err: impl std::fmt::Display) -> HubRelayError {
    HubRelayError::Config(format!("invalid resilience settings: {err}"))
}

fn retry_config(settings: &RetrySettings) -> ConfigResult<RetryConfig> {
    let wait = Duration::from_millis(settings.wait_duration_ms);
    let builder = RetryConfig::builder().max_attempts(settings.max_attempts);
    let builder = match settings.backoff {
        BackoffKind::Fixed => builder.fixed_backoff(wait),
        BackoffKind::Exponential => builder.exponential_backoff(
            wait,
            settings.multiplier,
            Duration::from_millis(settings.max_wait_ms),
        ),
    };
    builder.build()
}

fn breaker_config(
    name: &str,
    settings: &CircuitBreakerSettings,
) -> ConfigResult<CircuitBreakerConfig> {
    let window = settings.sliding_window_size as usize;
    let minimum_calls = settings.minimum_number_of_calls.map_or(window, |calls| calls as usize);

    CircuitBreakerConfig::builder()
        .name(name)
        .sliding_window_size(window)
        .minimum_number_of_calls(minimum_calls)
        .failure_rate_threshold(settings.failure_rate_threshold)
        .wait_duration_in_open_state(Duration::from_secs(settings.wait_duration_in_open_state_secs))
        .permitted_calls_in_half_open_state(settings.permitted_calls_in_half_open_state)
        .automatic_transition_from_open_to_half_open(
            settings.automatic_transition_from_open_to_half_open,
        )
        .build()
}
