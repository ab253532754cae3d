#![forbid(unsafe_code)]

//! # lifeline
//!
//! Resilience for outbound calls: retry strategies and a failure-tracking circuit breaker,
//! wrapped around any [`tower::Service`] transport.
//!
//! ## Features
//!
//! - **Retry strategies**: [`NoRetry`], [`FixedBackoffRetry`], [`ExponentialBackoffRetry`]
//! - **Circuit breaker** with one probe per retry window while open
//! - [`CircuitBreakerStrategy`] to retry for as long as a shared breaker admits requests
//! - **Execution wrapper** ([`ResilientClient`]) with per-attempt deadlines, headers and cancellation
//! - Tower middleware ([`StrategyLayer`]) and a named-client [`Registry`]
//! - JSON configuration behind the default `config` feature
//!
//! ## Quick Start
//!
//! ```rust
//! use lifeline::{ExponentialBackoffRetry, ResilienceError, RetryStrategy};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let strategy = ExponentialBackoffRetry::new(3, Duration::from_millis(100)).geometric();
//!
//!     let result = strategy
//!         .execute(|| async {
//!             // Your async operation here
//!             Ok::<_, ResilienceError<std::io::Error>>(())
//!         })
//!         .await;
//!     assert!(result.is_ok());
//! }
//! ```

pub mod backoff;
pub mod circuit_breaker;
pub mod circuit_breaker_strategy;
pub mod client;
pub mod clock;
#[cfg(feature = "config")]
pub mod config;
pub mod error;
pub mod jitter;
pub mod layer;
pub mod prelude;
pub mod registry;
pub mod retry;
pub mod sleeper;
pub mod timeout;

// Re-exports
pub use backoff::{Backoff, BackoffError, MAX_BACKOFF};
pub use circuit_breaker::{
    Breaker, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBrokenError,
    CircuitState, NoOpCircuitBreaker,
};
pub use circuit_breaker_strategy::CircuitBreakerStrategy;
pub use client::{
    Header, HeaderError, Outbound, RequestOptions, ResilientClient, DEFAULT_TIMEOUT,
};
pub use clock::{Clock, ManualClock, MonotonicClock};
#[cfg(feature = "config")]
pub use config::{ClientConfig, ConfigError, StrategyConfig};
pub use error::ResilienceError;
pub use jitter::Jitter;
pub use layer::{StrategyLayer, StrategyService};
pub use registry::{Registry, RegistryError};
pub use retry::{ExponentialBackoffRetry, FixedBackoffRetry, NoRetry, RetryStrategy, Strategy};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use timeout::Deadline;
