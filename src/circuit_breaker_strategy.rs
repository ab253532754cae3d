//! Retry strategy driven by a shared circuit breaker.
//!
//! There is no retry budget of its own: after a failure the strategy retries for as long as the
//! breaker keeps admitting requests, which in practice means until `failure_threshold` failures
//! open it. Every attempt passes a fresh admission check, on top of the check made right after a
//! failure. While open, the first of those restarts the retry window, so the second refuses and
//! a failed probe ends the call however long it took.

use crate::circuit_breaker::{Breaker, CircuitBreaker};
use crate::{ResilienceError, RetryStrategy};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Adapts a [`Breaker`] into a [`RetryStrategy`].
///
/// Holds only a handle to the breaker; clones and other holders of the same `Arc` see and drive
/// the same state.
#[derive(Debug, Clone)]
pub struct CircuitBreakerStrategy {
    breaker: Arc<dyn Breaker>,
}

impl CircuitBreakerStrategy {
    pub fn new(breaker: Arc<dyn Breaker>) -> Self {
        Self { breaker }
    }

    /// Convenience for the default breaker type.
    pub fn from_breaker(breaker: Arc<CircuitBreaker>) -> Self {
        Self { breaker }
    }

    pub fn breaker(&self) -> &Arc<dyn Breaker> {
        &self.breaker
    }

    fn denied<E>(&self, cause: Option<ResilienceError<E>>) -> ResilienceError<E> {
        ResilienceError::circuit_broken(self.breaker.failure_count(), cause)
    }
}

impl RetryStrategy for CircuitBreakerStrategy {
    fn allow_request(&self) -> bool {
        self.breaker.allow_request()
    }

    fn execute<'a, T, E, Fut, Op>(&'a self, mut operation: Op) -> BoxFuture<'a, Result<T, ResilienceError<E>>>
    where
        T: Send + 'a,
        E: std::error::Error + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send + 'a,
        Op: FnMut() -> Fut + Send + 'a,
    {
        Box::pin(async move {
            let mut last = None;
            loop {
                if !self.breaker.allow_request() {
                    return Err(self.denied(last));
                }
                let err = match operation().await {
                    Ok(value) => {
                        self.breaker.mark_success();
                        return Ok(value);
                    }
                    Err(err) => err,
                };
                if let Err(broken) = self.breaker.mark_failure() {
                    return Err(ResilienceError::circuit_broken(broken.failures, Some(err)));
                }
                if !self.breaker.allow_request() {
                    return Err(self.denied(Some(err)));
                }
                debug!(
                    target: "lifeline::circuit_breaker_strategy",
                    failures = self.breaker.failure_count(),
                    error = %err,
                    "breaker still admitting; retrying"
                );
                last = Some(err);
            }
        })
    }
}
