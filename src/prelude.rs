//! Convenient re-exports for common lifeline types.
pub use crate::{
    backoff::{Backoff, BackoffError},
    circuit_breaker::{Breaker, CircuitBreaker, CircuitBreakerConfig, CircuitState},
    circuit_breaker_strategy::CircuitBreakerStrategy,
    client::{Header, Outbound, RequestOptions, ResilientClient},
    jitter::Jitter,
    layer::StrategyLayer,
    registry::Registry,
    retry::{ExponentialBackoffRetry, FixedBackoffRetry, NoRetry, RetryStrategy, Strategy},
    ResilienceError,
};
