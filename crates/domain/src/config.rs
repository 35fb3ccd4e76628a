//! Configuration structures for the bridge.
//!
//! Every section has serde defaults so a configuration file only needs to
//! name what differs from them. Loading and environment overrides live in
//! the infrastructure crate.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::IntegrationType;
use crate::{HubRelayError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub hub: HubConfig,
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    pub token_cache: TokenCacheConfig,
    pub resilience: ResilienceConfig,
    pub integrations: IntegrationsConfig,
    pub logging: LoggingConfig,
}

impl BridgeConfig {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.hub.url.trim().is_empty() {
            return Err(config_error("hub.url must not be empty"));
        }
        if self.hub.request_timeout_secs == 0 {
            return Err(config_error("hub.request_timeout_secs must be greater than 0"));
        }
        if self.database.pool_size == 0 {
            return Err(config_error("database.pool_size must be greater than 0"));
        }
        if self.queue.max_concurrent_messages == 0 {
            return Err(config_error("queue.max_concurrent_messages must be greater than 0"));
        }
        if self.resilience.retry.max_attempts == 0 {
            return Err(config_error("resilience.retry.max_attempts must be greater than 0"));
        }
        self.resilience.circuit_breaker.validate("resilience.circuit_breaker")?;
        self.resilience.half_open_stability.validate("resilience.half_open_stability")?;

        for (kind, settings) in self.integrations.configured() {
            if settings.batch_limit == 0 {
                return Err(config_error(format!("integrations.{kind}: batch_limit must be > 0")));
            }
            if settings.timer_period_ms == 0 {
                return Err(config_error(format!(
                    "integrations.{kind}: timer_period_ms must be > 0"
                )));
            }
        }
        Ok(())
    }
}

fn config_error(message: impl Into<String>) -> HubRelayError {
    HubRelayError::Config(message.into())
}

/// Remote hub connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub url: String,
    /// Sent as the `App-Token` header on every request.
    pub app_token: String,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    /// Credentials per partition key.
    pub partitions: BTreeMap<String, PartitionCredentials>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            app_token: String::new(),
            request_timeout_secs: 30,
            user_agent: concat!("hubrelay/", env!("CARGO_PKG_VERSION")).to_string(),
            partitions: BTreeMap::new(),
        }
    }
}

/// Api-key/secret pair exchanged for a bearer token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionCredentials {
    pub api_key: String,
    pub secret_key: String,
}

impl fmt::Debug for PartitionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionCredentials")
            .field("api_key", &self.api_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: PathBuf::from("hubrelay.db"), pool_size: 4 }
    }
}

/// Intake concurrency, the analogue of the broker's prefetch count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub max_concurrent_messages: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { max_concurrent_messages: 8 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenCacheConfig {
    pub max_entries: u64,
    /// Optional upper bound on how long a token stays cached.
    pub ttl_secs: Option<u64>,
}

impl Default for TokenCacheConfig {
    fn default() -> Self {
        Self { max_entries: 10_000, ttl_secs: None }
    }
}

/// Retry and circuit breaker settings applied to every hub call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub retry: RetrySettings,
    pub circuit_breaker: CircuitBreakerSettings,
    pub half_open_stability: CircuitBreakerSettings,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retry: RetrySettings::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
            half_open_stability: CircuitBreakerSettings::half_open_stability(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub wait_duration_ms: u64,
    pub backoff: BackoffKind,
    /// Growth factor for exponential backoff.
    pub multiplier: f64,
    /// Ceiling for exponential backoff.
    pub max_wait_ms: u64,
    /// Statuses retried in addition to the built-in classification.
    pub additional_retryable_statuses: Vec<u16>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            wait_duration_ms: 2_000,
            backoff: BackoffKind::Fixed,
            multiplier: 2.0,
            max_wait_ms: 30_000,
            additional_retryable_statuses: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub sliding_window_size: u32,
    /// Defaults to the window size when unset.
    pub minimum_number_of_calls: Option<u32>,
    /// Percentage in `(0, 100]`.
    pub failure_rate_threshold: f32,
    pub wait_duration_in_open_state_secs: u64,
    pub permitted_calls_in_half_open_state: u32,
    pub automatic_transition_from_open_to_half_open: bool,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            sliding_window_size: 3,
            minimum_number_of_calls: None,
            failure_rate_threshold: 50.0,
            wait_duration_in_open_state_secs: 60,
            permitted_calls_in_half_open_state: 3,
            automatic_transition_from_open_to_half_open: true,
        }
    }
}

impl CircuitBreakerSettings {
    /// Defaults of the secondary breaker: any failure in a full window opens it.
    pub fn half_open_stability() -> Self {
        Self {
            sliding_window_size: 3,
            minimum_number_of_calls: None,
            failure_rate_threshold: 0.2,
            wait_duration_in_open_state_secs: 60,
            permitted_calls_in_half_open_state: 10,
            automatic_transition_from_open_to_half_open: false,
        }
    }

    fn validate(&self, section: &str) -> Result<()> {
        if self.sliding_window_size == 0 {
            return Err(config_error(format!("{section}.sliding_window_size must be > 0")));
        }
        if self.minimum_number_of_calls == Some(0) {
            return Err(config_error(format!("{section}.minimum_number_of_calls must be > 0")));
        }
        if !(self.failure_rate_threshold > 0.0 && self.failure_rate_threshold <= 100.0) {
            return Err(config_error(format!(
                "{section}.failure_rate_threshold must be in (0, 100]"
            )));
        }
        if self.permitted_calls_in_half_open_state == 0 {
            return Err(config_error(format!(
                "{section}.permitted_calls_in_half_open_state must be > 0"
            )));
        }
        Ok(())
    }
}

/// Per-type settings. A missing section disables the type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationsConfig {
    pub update_stock: Option<IntegrationSettings>,
    pub update_product_price: Option<IntegrationSettings>,
    pub update_order_status: Option<IntegrationSettings>,
    pub update_retailer_credit: Option<IntegrationSettings>,
    pub save_recommendation_list: Option<IntegrationSettings>,
}

impl IntegrationsConfig {
    pub const fn get(&self, kind: IntegrationType) -> Option<&IntegrationSettings> {
        match kind {
            IntegrationType::UpdateStock => self.update_stock.as_ref(),
            IntegrationType::UpdateProductPrice => self.update_product_price.as_ref(),
            IntegrationType::UpdateOrderStatus => self.update_order_status.as_ref(),
            IntegrationType::UpdateRetailerCredit => self.update_retailer_credit.as_ref(),
            IntegrationType::SaveRecommendationList => self.save_recommendation_list.as_ref(),
        }
    }

    /// Enabled types with their settings.
    pub fn configured(&self) -> Vec<(IntegrationType, &IntegrationSettings)> {
        IntegrationType::ALL
            .into_iter()
            .filter_map(|kind| self.get(kind).map(|settings| (kind, settings)))
            .filter(|(_, settings)| settings.enabled)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationSettings {
    pub queue_name: String,
    pub timer_period_ms: u64,
    pub batch_limit: usize,
    pub enabled: bool,
}

impl Default for IntegrationSettings {
    fn default() -> Self {
        Self { queue_name: String::new(), timer_period_ms: 60_000, batch_limit: 100, enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}
