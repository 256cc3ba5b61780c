//! Engine configuration (spec §6 ambient configuration surface).
//!
//! Shaped after the teacher's `config::types::Config` — one struct per
//! concern, `serde(default = "...")` functions rather than `Default` impls
//! wherever a lone field needs a non-zero default, trimmed to the knobs
//! this core actually has (poll cadence, margin-call threshold, rate
//! limiting, retry policy, credential persistence, metrics binding).
//! Loading a config file and wiring CLI flags is the strategy runner's
//! job, not this crate's (spec §1 Non-goals); this module only defines
//! the shape and its defaults.

use std::path::PathBuf;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ratelimit::{BucketConfig, EndpointCategory};
use crate::retry::RetryConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub reconciliation: ReconciliationConfig,
    pub risk: RiskConfig,
    #[serde(default)]
    pub rate_limits: RateLimitConfig,
    #[serde(default)]
    pub retry: RetryPolicyConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Polling cadence and unknown-id verification timing (spec §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    #[serde(default = "default_poll_interval_ms", with = "duration_millis")]
    pub poll_interval: Duration,

    #[serde(default = "default_unknown_id_delay_ms", with = "duration_millis")]
    pub unknown_id_verification_delay: Duration,

    #[serde(default = "default_filled_ring_capacity")]
    pub filled_ring_capacity: usize,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(default_poll_interval_ms()),
            unknown_id_verification_delay: Duration::from_millis(default_unknown_id_delay_ms()),
            filled_ring_capacity: default_filled_ring_capacity(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_unknown_id_delay_ms() -> u64 {
    2_000
}

fn default_filled_ring_capacity() -> usize {
    crate::reconciler::FILLED_RING_CAPACITY
}

/// `serde(with)` module for a millisecond-valued `Duration` field.
mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Risk and order-count limits (spec §4.1, §4.2, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_max_orders")]
    pub max_orders: u64,

    /// Margin ratio, below which `marginCallQuantity` is evaluated
    /// (spec §4.7). 1.0 means a call fires as soon as margin is exhausted.
    #[serde(default = "default_margin_call_threshold")]
    pub margin_call_threshold: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_orders: default_max_orders(),
            margin_call_threshold: default_margin_call_threshold(),
        }
    }
}

fn default_max_orders() -> u64 {
    10_000
}

fn default_margin_call_threshold() -> Decimal {
    Decimal::ONE
}

/// Per-endpoint-category token bucket configuration (spec §4.5 rate
/// limiting). Defaults match [`BucketConfig::for_category`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub order_entry: BucketConfig,
    pub order_cancel: BucketConfig,
    pub account_query: BucketConfig,
    pub market_data: BucketConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            order_entry: BucketConfig::for_category(EndpointCategory::OrderEntry),
            order_cancel: BucketConfig::for_category(EndpointCategory::OrderCancel),
            account_query: BucketConfig::for_category(EndpointCategory::AccountQuery),
            market_data: BucketConfig::for_category(EndpointCategory::MarketData),
        }
    }
}

/// Fixed backoff policy for transport retries (spec §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicyConfig {
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: usize,

    #[serde(default = "default_retry_delay_ms", with = "duration_millis")]
    pub delay: Duration,
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            delay: Duration::from_millis(default_retry_delay_ms()),
        }
    }
}

fn default_retry_attempts() -> usize {
    10
}

fn default_retry_delay_ms() -> u64 {
    3_000
}

impl From<&RetryPolicyConfig> for RetryConfig {
    fn from(config: &RetryPolicyConfig) -> Self {
        RetryConfig {
            max_attempts: config.max_attempts,
            delay: config.delay,
        }
    }
}

/// Where the brokerage credential JSON (spec §6) is read from / written to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_credential_path")]
    pub credential_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            credential_path: default_credential_path(),
        }
    }
}

fn default_credential_path() -> PathBuf {
    PathBuf::from("./data/brokerage_credentials.json")
}

/// Prometheus exporter binding (spec §6 "Metrics").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_metrics_addr")]
    pub bind_address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            bind_address: default_metrics_addr(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_metrics_addr() -> String {
    "127.0.0.1:9184".to_string()
}

impl EngineConfig {
    /// Parses an `EngineConfig` from a JSON document (spec §6 does not
    /// mandate a format; JSON is chosen to match the credential file's own
    /// encoding and this crate's existing `serde_json` dependency).
    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_and_reconciliation_sections_take_their_defaults_when_omitted() {
        let raw = r#"{
            "reconciliation": {},
            "risk": { "max_orders": 500 }
        }"#;
        let config = EngineConfig::from_json(raw).unwrap();
        assert_eq!(config.reconciliation.poll_interval, Duration::from_secs(1));
        assert_eq!(config.risk.max_orders, 500);
        assert_eq!(config.risk.margin_call_threshold, Decimal::ONE);
        assert_eq!(
            config.rate_limits.order_entry.burst_capacity,
            BucketConfig::for_category(EndpointCategory::OrderEntry).burst_capacity
        );
    }

    #[test]
    fn retry_policy_config_converts_into_retry_config() {
        let policy = RetryPolicyConfig::default();
        let retry: RetryConfig = (&policy).into();
        assert_eq!(retry.max_attempts, 10);
        assert_eq!(retry.delay, Duration::from_secs(3));
    }
}
