//! Declarative client configuration (JSON).
//!
//! ```json
//! {
//!   "timeout_ms": 5000,
//!   "headers": [{ "name": "accept", "values": ["application/json"] }],
//!   "strategy": { "kind": "exponential_backoff", "max_retries": 4, "backoff_ms": 200, "growth": "geometric" }
//! }
//! ```
//!
//! Every field has a default matching the programmatic one, so `{}` is a valid client config
//! (no retry, 100 s timeout).

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
use crate::client::{Header, HeaderError, ResilientClient, DEFAULT_TIMEOUT};
use crate::{
    BackoffError, CircuitBreakerStrategy, ExponentialBackoffRetry, FixedBackoffRetry, Jitter,
    NoRetry, Strategy,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Breaker(#[from] CircuitBreakerError),
    #[error(transparent)]
    Backoff(#[from] BackoffError),
    #[error(transparent)]
    Header(#[from] HeaderError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterConfig {
    #[default]
    None,
    Full,
    Equal,
}

impl From<JitterConfig> for Jitter {
    fn from(value: JitterConfig) -> Self {
        match value {
            JitterConfig::None => Jitter::None,
            JitterConfig::Full => Jitter::Full,
            JitterConfig::Equal => Jitter::Equal,
        }
    }
}

/// Delay curve of `exponential_backoff`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Growth {
    /// `backoff × retry`
    #[default]
    Linear,
    /// `backoff × 2^(retry-1)`
    Geometric,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub failure_threshold: usize,
    pub circuit_retry_ms: u64,
    pub circuit_lockout_ms: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        let defaults = CircuitBreakerConfig::default();
        Self {
            failure_threshold: defaults.failure_threshold(),
            circuit_retry_ms: millis(defaults.circuit_retry()),
            circuit_lockout_ms: millis(defaults.circuit_lockout()),
        }
    }
}

impl BreakerSettings {
    pub fn to_config(&self) -> Result<CircuitBreakerConfig, CircuitBreakerError> {
        CircuitBreakerConfig::new(
            self.failure_threshold,
            Duration::from_millis(self.circuit_retry_ms),
            Duration::from_millis(self.circuit_lockout_ms),
        )
    }

    pub fn build(&self) -> Result<CircuitBreaker, CircuitBreakerError> {
        Ok(CircuitBreaker::with_config(self.to_config()?))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    #[default]
    NoRetry,
    FixedBackoff {
        max_retries: usize,
        backoff_ms: u64,
        #[serde(default)]
        jitter: JitterConfig,
    },
    ExponentialBackoff {
        max_retries: usize,
        backoff_ms: u64,
        #[serde(default)]
        growth: Growth,
        #[serde(default)]
        max_backoff_ms: Option<u64>,
        #[serde(default)]
        jitter: JitterConfig,
    },
    /// Builds a fresh breaker; share one across clients programmatically instead.
    CircuitBreaker(BreakerSettings),
}

impl StrategyConfig {
    pub fn build(&self) -> Result<Strategy, ConfigError> {
        let strategy: Strategy = match self {
            StrategyConfig::NoRetry => NoRetry.into(),
            StrategyConfig::FixedBackoff { max_retries, backoff_ms, jitter } => {
                FixedBackoffRetry::new(*max_retries, Duration::from_millis(*backoff_ms))
                    .with_jitter((*jitter).into())
                    .into()
            }
            StrategyConfig::ExponentialBackoff {
                max_retries,
                backoff_ms,
                growth,
                max_backoff_ms,
                jitter,
            } => {
                let mut retry =
                    ExponentialBackoffRetry::new(*max_retries, Duration::from_millis(*backoff_ms));
                if *growth == Growth::Geometric {
                    retry = retry.geometric();
                }
                if let Some(cap) = max_backoff_ms {
                    retry = retry.with_max_backoff(Duration::from_millis(*cap))?;
                }
                retry.with_jitter((*jitter).into()).into()
            }
            StrategyConfig::CircuitBreaker(settings) => {
                CircuitBreakerStrategy::from_breaker(Arc::new(settings.build()?)).into()
            }
        };
        Ok(strategy)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderConfig {
    pub name: String,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub headers: Vec<HeaderConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { timeout_ms: default_timeout_ms(), strategy: StrategyConfig::default(), headers: Vec::new() }
    }
}

impl ClientConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Validate and wrap `service` in a client.
    pub fn build<S>(&self, service: S) -> Result<ResilientClient<S>, ConfigError> {
        let headers = self
            .headers
            .iter()
            .map(|h| Header::new(h.name.clone(), h.values.iter().cloned()))
            .collect::<Result<Vec<_>, _>>()?;
        let client = ResilientClient::new(service, self.strategy.build()?, self.timeout());
        client.set_default_headers(headers);
        Ok(client)
    }
}

fn default_timeout_ms() -> u64 {
    millis(DEFAULT_TIMEOUT)
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
