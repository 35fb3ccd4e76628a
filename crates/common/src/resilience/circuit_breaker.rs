//! Count-based circuit breaker with a sliding outcome window.
//!
//! The breaker records the last `sliding_window_size` outcomes while CLOSED
//! and opens once the failure rate over a sufficiently full window reaches
//! the configured threshold. While OPEN it rejects calls for
//! `wait_duration_in_open_state`, then admits a fixed number of trial calls
//! in HALF_OPEN: all trials succeeding closes it again, any trial failing
//! re-opens it.
//!
//! All mutable state sits behind a single mutex, so outcome recording and
//! state transitions are atomic with respect to each other. Transitions are
//! announced (tracing event plus registered listeners) after the lock is
//! released.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{debug, info, warn};

//==============================================================================
// Time Abstraction for Testability
//==============================================================================

/// Source of time for the breaker.
///
/// Production code uses [`SystemClock`]; tests drive [`MockClock`] by hand so
/// open-state waits elapse without sleeping.
pub trait Clock: Send + Sync + 'static {
    /// Monotonic instant used for wait-duration arithmetic.
    fn now(&self) -> Instant;

    /// Wall-clock time used to timestamp state transitions.
    fn system_time(&self) -> SystemTime;

    /// Milliseconds since the UNIX epoch.
    fn millis_since_epoch(&self) -> u64 {
        let millis =
            self.system_time().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        u64::try_from(millis).unwrap_or(u64::MAX)
    }
}

/// Real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
}

impl<T: Clock> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn system_time(&self) -> SystemTime {
        (**self).system_time()
    }
}

/// Manually advanced clock for deterministic tests.
///
/// Clones share the same elapsed time, so a test can keep one handle and
/// hand another to the breaker.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self { start: Instant::now(), elapsed: Arc::new(Mutex::new(Duration::ZERO)) }
    }

    /// Move time forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock().unwrap_or_else(PoisonError::into_inner) += duration;
    }

    pub fn set_elapsed(&self, duration: Duration) {
        *self.elapsed.lock().unwrap_or_else(PoisonError::into_inner) = duration;
    }

    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        UNIX_EPOCH + self.elapsed()
    }
}

//==============================================================================
// Error Types
//==============================================================================

/// Configuration validation error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Errors produced by a breaker-protected call.
///
/// Generic over the operation's own error type so callers keep the original
/// failure.
#[derive(Debug, Error)]
pub enum ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// The breaker rejected the call without running it.
    #[error("Circuit breaker '{breaker}' is open, rejecting calls")]
    CircuitOpen { breaker: String },

    /// The operation ran and failed.
    #[error("{source}")]
    OperationFailed {
        #[source]
        source: E,
    },
}

impl<E> ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    pub const fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}

/// Result type for breaker-protected operations.
pub type ResilienceResult<T, E> = Result<T, ResilienceError<E>>;

/// Result type for configuration validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

//==============================================================================
// State, Configuration and Events
//==============================================================================

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Calls pass through and outcomes are recorded.
    Closed,
    /// Calls are rejected until the open-state wait elapses.
    Open,
    /// A limited number of trial calls probe for recovery.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Name used in logs, events and rejection errors.
    pub name: String,
    /// Number of most recent outcomes considered in CLOSED state.
    pub sliding_window_size: usize,
    /// Outcomes required before the failure rate is evaluated. Values above
    /// the window size are capped to it.
    pub minimum_number_of_calls: usize,
    /// Failure percentage in `(0, 100]` at or above which the breaker opens.
    pub failure_rate_threshold: f32,
    /// How long the breaker stays OPEN before probing.
    pub wait_duration_in_open_state: Duration,
    /// Trial calls admitted while HALF_OPEN.
    pub permitted_calls_in_half_open_state: u32,
    /// Report HALF_OPEN as soon as the wait elapses instead of waiting for
    /// the next permission request.
    pub automatic_transition_from_open_to_half_open: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            sliding_window_size: 100,
            minimum_number_of_calls: 100,
            failure_rate_threshold: 50.0,
            wait_duration_in_open_state: Duration::from_secs(60),
            permitted_calls_in_half_open_state: 10,
            automatic_transition_from_open_to_half_open: false,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.sliding_window_size == 0 {
            return Err(invalid("sliding_window_size must be greater than 0"));
        }
        if self.minimum_number_of_calls == 0 {
            return Err(invalid("minimum_number_of_calls must be greater than 0"));
        }
        if !(self.failure_rate_threshold > 0.0 && self.failure_rate_threshold <= 100.0) {
            return Err(invalid("failure_rate_threshold must be within (0, 100]"));
        }
        if self.permitted_calls_in_half_open_state == 0 {
            return Err(invalid("permitted_calls_in_half_open_state must be greater than 0"));
        }
        Ok(())
    }

    /// Minimum outcomes before evaluation, capped to the window size.
    pub fn effective_minimum_calls(&self) -> usize {
        self.minimum_number_of_calls.min(self.sliding_window_size)
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid { message: message.to_string() }
}

/// Builder for [`CircuitBreakerConfig`]
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    pub fn new() -> Self {
        Self { config: CircuitBreakerConfig::default() }
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    #[must_use]
    pub const fn sliding_window_size(mut self, size: usize) -> Self {
        self.config.sliding_window_size = size;
        self
    }

    #[must_use]
    pub const fn minimum_number_of_calls(mut self, calls: usize) -> Self {
        self.config.minimum_number_of_calls = calls;
        self
    }

    #[must_use]
    pub const fn failure_rate_threshold(mut self, percent: f32) -> Self {
        self.config.failure_rate_threshold = percent;
        self
    }

    #[must_use]
    pub const fn wait_duration_in_open_state(mut self, wait: Duration) -> Self {
        self.config.wait_duration_in_open_state = wait;
        self
    }

    #[must_use]
    pub const fn permitted_calls_in_half_open_state(mut self, calls: u32) -> Self {
        self.config.permitted_calls_in_half_open_state = calls;
        self
    }

    #[must_use]
    pub const fn automatic_transition_from_open_to_half_open(mut self, enabled: bool) -> Self {
        self.config.automatic_transition_from_open_to_half_open = enabled;
        self
    }

    /// Build a breaker on a custom clock directly (useful for testing).
    pub fn clock<C: Clock>(self, clock: C) -> CircuitBreakerBuilderWithClock<C> {
        CircuitBreakerBuilderWithClock { config: self.config, clock }
    }

    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Builder that produces a [`CircuitBreaker`] on a custom clock.
pub struct CircuitBreakerBuilderWithClock<C: Clock> {
    config: CircuitBreakerConfig,
    clock: C,
}

impl<C: Clock> CircuitBreakerBuilderWithClock<C> {
    pub fn build(self) -> ConfigResult<CircuitBreaker<C>> {
        CircuitBreaker::with_clock(self.config, self.clock)
    }
}

/// A state change, delivered to listeners after it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pub breaker: String,
    pub from: CircuitState,
    pub to: CircuitState,
    pub at: SystemTime,
}

type TransitionListener = Arc<dyn Fn(&StateTransition) + Send + Sync>;

/// Point-in-time snapshot for monitoring.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    /// `None` until the window holds the minimum number of calls.
    pub failure_rate: Option<f32>,
    pub buffered_calls: usize,
    pub failed_calls: usize,
    pub not_permitted_calls: u64,
    pub total_calls: u64,
}

//==============================================================================
// Sliding Window
//==============================================================================

#[derive(Debug)]
struct SlidingWindow {
    outcomes: VecDeque<bool>,
    capacity: usize,
    failures: usize,
}

impl SlidingWindow {
    fn new(capacity: usize) -> Self {
        Self { outcomes: VecDeque::with_capacity(capacity), capacity, failures: 0 }
    }

    fn record(&mut self, failed: bool) {
        if self.outcomes.len() == self.capacity && self.outcomes.pop_front() == Some(true) {
            self.failures -= 1;
        }
        self.outcomes.push_back(failed);
        if failed {
            self.failures += 1;
        }
    }

    fn len(&self) -> usize {
        self.outcomes.len()
    }

    #[allow(clippy::cast_precision_loss)]
    fn failure_rate(&self) -> f32 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        self.failures as f32 * 100.0 / self.outcomes.len() as f32
    }

    fn reset(&mut self) {
        self.outcomes.clear();
        self.failures = 0;
    }
}

#[derive(Debug)]
struct BreakerCore {
    state: CircuitState,
    window: SlidingWindow,
    opened_at: Option<Instant>,
    half_open_admitted: u32,
    half_open_successes: u32,
    /// Bumped on every transition; ties a permit to the state that granted it.
    generation: u64,
}

//==============================================================================
// Circuit Breaker
//==============================================================================

/// Thread-safe circuit breaker. Clones share state.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    config: Arc<CircuitBreakerConfig>,
    core: Arc<Mutex<BreakerCore>>,
    listeners: Arc<RwLock<Vec<TransitionListener>>>,
    total_calls: Arc<AtomicU64>,
    not_permitted_calls: Arc<AtomicU64>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.config.name)
            .field("state", &self.lock_core().state)
            .field("total_calls", &self.total_calls.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            core: Arc::clone(&self.core),
            listeners: Arc::clone(&self.listeners),
            total_calls: Arc::clone(&self.total_calls),
            not_permitted_calls: Arc::clone(&self.not_permitted_calls),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl CircuitBreaker<SystemClock> {
    pub fn new(config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a breaker driven by a custom clock.
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;
        let window = SlidingWindow::new(config.sliding_window_size);

        Ok(Self {
            config: Arc::new(config),
            core: Arc::new(Mutex::new(BreakerCore {
                state: CircuitState::Closed,
                window,
                opened_at: None,
                half_open_admitted: 0,
                half_open_successes: 0,
                generation: 0,
            })),
            listeners: Arc::new(RwLock::new(Vec::new())),
            total_calls: Arc::new(AtomicU64::new(0)),
            not_permitted_calls: Arc::new(AtomicU64::new(0)),
            clock: Arc::new(clock),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Register a callback invoked after every state transition.
    pub fn on_transition<F>(&self, listener: F)
    where
        F: Fn(&StateTransition) + Send + Sync + 'static,
    {
        self.listeners.write().unwrap_or_else(PoisonError::into_inner).push(Arc::new(listener));
    }

    /// Current state.
    ///
    /// With automatic transition enabled, an elapsed open-state wait is
    /// reported (and applied) as HALF_OPEN.
    pub fn state(&self) -> CircuitState {
        let mut transitions = Vec::new();
        let state = {
            let mut core = self.lock_core();
            if self.config.automatic_transition_from_open_to_half_open {
                self.promote_if_wait_elapsed(&mut core, &mut transitions);
            }
            core.state
        };
        self.publish(transitions);
        state
    }

    /// Ask for permission to run one call.
    ///
    /// Every granted permission must be followed by exactly one
    /// [`record_success`](Self::record_success) or
    /// [`record_failure`](Self::record_failure).
    pub fn try_acquire_permission(&self) -> bool {
        self.acquire().is_some()
    }

    /// Grant a permission and return the generation it belongs to.
    fn acquire(&self) -> Option<u64> {
        let mut transitions = Vec::new();
        let granted = {
            let mut core = self.lock_core();
            self.promote_if_wait_elapsed(&mut core, &mut transitions);
            let permitted = match core.state {
                CircuitState::Closed => true,
                CircuitState::Open => false,
                CircuitState::HalfOpen => {
                    if core.half_open_admitted < self.config.permitted_calls_in_half_open_state {
                        core.half_open_admitted += 1;
                        true
                    } else {
                        false
                    }
                }
            };
            permitted.then_some(core.generation)
        };
        self.publish(transitions);

        if granted.is_none() {
            self.not_permitted_calls.fetch_add(1, Ordering::Relaxed);
        }
        granted
    }

    /// Give back a permission whose call ended without an outcome.
    ///
    /// Only a HALF_OPEN trial slot of the same generation is returned; a
    /// permit granted before a later transition is already void.
    fn release_unrecorded(&self, generation: u64) {
        let mut core = self.lock_core();
        if core.generation == generation && core.state == CircuitState::HalfOpen {
            core.half_open_admitted = core.half_open_admitted.saturating_sub(1);
        }
        debug!(breaker = %self.config.name, "call dropped before completion, permit released");
    }

    /// Run `operation` if the breaker permits it and record the outcome.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let Some(generation) = self.acquire() else {
            debug!(breaker = %self.config.name, "circuit breaker rejected call");
            return Err(ResilienceError::CircuitOpen { breaker: self.config.name.clone() });
        };
        let mut permit = CallPermit { breaker: self, generation, settled: false };

        self.total_calls.fetch_add(1, Ordering::Relaxed);

        let outcome = operation().await;
        permit.settled = true;

        match outcome {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(error) => {
                self.record_failure();
                Err(ResilienceError::OperationFailed { source: error })
            }
        }
    }

    pub fn record_success(&self) {
        let mut transitions = Vec::new();
        {
            let mut core = self.lock_core();
            match core.state {
                CircuitState::Closed => {
                    core.window.record(false);
                    self.evaluate_window(&mut core, &mut transitions);
                }
                CircuitState::HalfOpen => {
                    core.half_open_successes += 1;
                    if core.half_open_successes >= self.config.permitted_calls_in_half_open_state {
                        self.transition(&mut core, CircuitState::Closed, &mut transitions);
                    }
                }
                CircuitState::Open => {
                    debug!(breaker = %self.config.name, "ignoring success recorded while open");
                }
            }
        }
        self.publish(transitions);
    }

    pub fn record_failure(&self) {
        let mut transitions = Vec::new();
        {
            let mut core = self.lock_core();
            match core.state {
                CircuitState::Closed => {
                    core.window.record(true);
                    self.evaluate_window(&mut core, &mut transitions);
                }
                CircuitState::HalfOpen => {
                    self.transition(&mut core, CircuitState::Open, &mut transitions);
                }
                CircuitState::Open => {}
            }
        }
        self.publish(transitions);
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let core = self.lock_core();
        let buffered_calls = core.window.len();
        let failure_rate = (buffered_calls >= self.config.effective_minimum_calls())
            .then(|| core.window.failure_rate());

        CircuitBreakerMetrics {
            state: core.state,
            failure_rate,
            buffered_calls,
            failed_calls: core.window.failures,
            not_permitted_calls: self.not_permitted_calls.load(Ordering::Acquire),
            total_calls: self.total_calls.load(Ordering::Acquire),
        }
    }

    /// Force the breaker back to CLOSED with an empty window.
    pub fn reset(&self) {
        let mut transitions = Vec::new();
        {
            let mut core = self.lock_core();
            self.transition(&mut core, CircuitState::Closed, &mut transitions);
            core.window.reset();
        }
        self.publish(transitions);
        info!(breaker = %self.config.name, "circuit breaker manually reset");
    }

    fn lock_core(&self) -> MutexGuard<'_, BreakerCore> {
        self.core.lock().unwrap_or_else(|poisoned| {
            warn!(breaker = %self.config.name, "circuit breaker lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn evaluate_window(&self, core: &mut BreakerCore, transitions: &mut Vec<StateTransition>) {
        if core.window.len() >= self.config.effective_minimum_calls()
            && core.window.failure_rate() >= self.config.failure_rate_threshold
        {
            self.transition(core, CircuitState::Open, transitions);
        }
    }

    fn promote_if_wait_elapsed(
        &self,
        core: &mut BreakerCore,
        transitions: &mut Vec<StateTransition>,
    ) {
        if core.state != CircuitState::Open {
            return;
        }
        let elapsed = core.opened_at.map_or(true, |opened| {
            self.clock.now().duration_since(opened) >= self.config.wait_duration_in_open_state
        });
        if elapsed {
            self.transition(core, CircuitState::HalfOpen, transitions);
        }
    }

    fn transition(
        &self,
        core: &mut BreakerCore,
        to: CircuitState,
        transitions: &mut Vec<StateTransition>,
    ) {
        let from = core.state;
        if from == to {
            return;
        }

        core.state = to;
        core.generation = core.generation.wrapping_add(1);
        core.half_open_admitted = 0;
        core.half_open_successes = 0;
        match to {
            CircuitState::Open => core.opened_at = Some(self.clock.now()),
            CircuitState::HalfOpen => {}
            CircuitState::Closed => {
                core.opened_at = None;
                core.window.reset();
            }
        }

        transitions.push(StateTransition {
            breaker: self.config.name.clone(),
            from,
            to,
            at: self.clock.system_time(),
        });
    }

    fn publish(&self, transitions: Vec<StateTransition>) {
        if transitions.is_empty() {
            return;
        }
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner).clone();

        for transition in transitions {
            match transition.to {
                CircuitState::Open => warn!(
                    breaker = %transition.breaker,
                    from = %transition.from,
                    to = %transition.to,
                    wait_secs = self.config.wait_duration_in_open_state.as_secs(),
                    "circuit breaker opened"
                ),
                CircuitState::HalfOpen | CircuitState::Closed => info!(
                    breaker = %transition.breaker,
                    from = %transition.from,
                    to = %transition.to,
                    "circuit breaker state changed"
                ),
            }
            for listener in &listeners {
                listener(&transition);
            }
        }
    }
}

/// Permission held by an in-flight [`CircuitBreaker::execute`] call.
///
/// Dropped unsettled when the caller abandons the future, which frees the
/// trial slot instead of leaving HALF_OPEN waiting on an outcome forever.
struct CallPermit<'a, C: Clock> {
    breaker: &'a CircuitBreaker<C>,
    generation: u64,
    settled: bool,
}

impl<C: Clock> Drop for CallPermit<'_, C> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.release_unrecorded(self.generation);
        }
    }
}
