//! Retry strategies.
//!
//! Every strategy runs the same loop: attempt the operation, return its value on success, and on
//! failure either give up or wait and try again.
//!
//! - [`NoRetry`]: one attempt; failures propagate immediately.
//! - [`FixedBackoffRetry`]: up to `max_retries` retries, each after the same wait.
//! - [`ExponentialBackoffRetry`]: up to `max_retries` retries; the wait before retry `n` is
//!   `backoff × n`. Call [`ExponentialBackoffRetry::geometric`] for `backoff × 2^(n-1)` instead.
//! - [`CircuitBreakerStrategy`]: retries for as long as a shared breaker keeps admitting requests.
//!
//! Failures are not classified: timeouts, cancellations and operation errors are all retried.
//! Once the budget is spent the last failure is returned unchanged. A retry that succeeds
//! returns its value to the caller.
//!
//! ```rust
//! use lifeline::prelude::*;
//! use std::time::Duration;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let strategy = FixedBackoffRetry::new(2, Duration::from_millis(10));
//! let value = strategy
//!     .execute(|| async { Ok::<_, ResilienceError<std::io::Error>>("done") })
//!     .await;
//! assert_eq!(value.unwrap(), "done");
//! # });
//! ```

use crate::circuit_breaker_strategy::CircuitBreakerStrategy;
use crate::{Backoff, BackoffError, Jitter, ResilienceError, Sleeper, TokioSleeper};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A policy governing whether and how a failed operation is re-issued.
pub trait RetryStrategy: Send + Sync + std::fmt::Debug {
    /// Pre-flight admission check, independent of execution.
    fn allow_request(&self) -> bool;

    /// Run `operation` under this strategy.
    fn execute<'a, T, E, Fut, Op>(&'a self, operation: Op) -> BoxFuture<'a, Result<T, ResilienceError<E>>>
    where
        T: Send + 'a,
        E: std::error::Error + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send + 'a,
        Op: FnMut() -> Fut + Send + 'a;
}

/// Single attempt, no retry.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRetry;

impl RetryStrategy for NoRetry {
    fn allow_request(&self) -> bool {
        true
    }

    fn execute<'a, T, E, Fut, Op>(&'a self, mut operation: Op) -> BoxFuture<'a, Result<T, ResilienceError<E>>>
    where
        T: Send + 'a,
        E: std::error::Error + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send + 'a,
        Op: FnMut() -> Fut + Send + 'a,
    {
        Box::pin(async move { operation().await })
    }
}

/// Retry loop shared by the bounded strategies.
#[derive(Clone)]
struct BoundedRetry {
    max_retries: usize,
    backoff: Backoff,
    jitter: Jitter,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for BoundedRetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedRetry")
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .field("jitter", &self.jitter)
            .field("sleeper", &self.sleeper)
            .finish()
    }
}

impl BoundedRetry {
    fn new(max_retries: usize, backoff: Backoff) -> Self {
        Self { max_retries, backoff, jitter: Jitter::None, sleeper: Arc::new(TokioSleeper) }
    }

    async fn run<T, E, Fut, Op>(&self, mut operation: Op) -> Result<T, ResilienceError<E>>
    where
        E: std::error::Error + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError<E>>>,
        Op: FnMut() -> Fut,
    {
        let mut retries = 0;
        loop {
            match operation().await {
                Ok(value) => {
                    if retries > 0 {
                        debug!(target: "lifeline::retry", retries, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if retries >= self.max_retries => {
                    if self.max_retries > 0 {
                        warn!(target: "lifeline::retry", retries, error = %err, "retries exhausted");
                    }
                    return Err(err);
                }
                Err(err) => {
                    retries += 1;
                    let delay = self.jitter.apply(self.backoff.delay(retries));
                    debug!(target: "lifeline::retry", retry = retries, ?delay, error = %err, "retrying");
                    self.sleeper.sleep(delay).await;
                }
            }
        }
    }
}

/// Retries after a constant wait.
#[derive(Debug, Clone)]
pub struct FixedBackoffRetry {
    inner: BoundedRetry,
}

impl FixedBackoffRetry {
    /// Retry up to `max_retries` times, waiting `backoff` before each retry.
    pub fn new(max_retries: usize, backoff: Duration) -> Self {
        Self { inner: BoundedRetry::new(max_retries, Backoff::fixed(backoff)) }
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.inner.jitter = jitter;
        self
    }

    pub fn with_sleeper<S: Sleeper + 'static>(mut self, sleeper: S) -> Self {
        self.inner.sleeper = Arc::new(sleeper);
        self
    }

    pub fn max_retries(&self) -> usize {
        self.inner.max_retries
    }

    pub fn backoff(&self) -> &Backoff {
        &self.inner.backoff
    }
}

impl RetryStrategy for FixedBackoffRetry {
    fn allow_request(&self) -> bool {
        true
    }

    fn execute<'a, T, E, Fut, Op>(&'a self, operation: Op) -> BoxFuture<'a, Result<T, ResilienceError<E>>>
    where
        T: Send + 'a,
        E: std::error::Error + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send + 'a,
        Op: FnMut() -> Fut + Send + 'a,
    {
        Box::pin(self.inner.run(operation))
    }
}

/// Retries with a growing wait.
///
/// By default the wait before retry `n` is `backoff × n`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoffRetry {
    inner: BoundedRetry,
}

impl ExponentialBackoffRetry {
    pub fn new(max_retries: usize, backoff: Duration) -> Self {
        Self { inner: BoundedRetry::new(max_retries, Backoff::linear(backoff)) }
    }

    /// Double the wait on every retry instead of growing it linearly.
    pub fn geometric(mut self) -> Self {
        let base = self.inner.backoff.base();
        self.inner.backoff = Backoff::exponential(base);
        self
    }

    /// Never wait longer than `max` between retries.
    pub fn with_max_backoff(mut self, max: Duration) -> Result<Self, BackoffError> {
        self.inner.backoff = self.inner.backoff.with_cap(max)?;
        Ok(self)
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.inner.jitter = jitter;
        self
    }

    pub fn with_sleeper<S: Sleeper + 'static>(mut self, sleeper: S) -> Self {
        self.inner.sleeper = Arc::new(sleeper);
        self
    }

    pub fn max_retries(&self) -> usize {
        self.inner.max_retries
    }

    pub fn backoff(&self) -> &Backoff {
        &self.inner.backoff
    }
}

impl RetryStrategy for ExponentialBackoffRetry {
    fn allow_request(&self) -> bool {
        true
    }

    fn execute<'a, T, E, Fut, Op>(&'a self, operation: Op) -> BoxFuture<'a, Result<T, ResilienceError<E>>>
    where
        T: Send + 'a,
        E: std::error::Error + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send + 'a,
        Op: FnMut() -> Fut + Send + 'a,
    {
        Box::pin(self.inner.run(operation))
    }
}

/// Any of the built-in strategies, chosen at runtime.
#[derive(Debug, Clone)]
pub enum Strategy {
    NoRetry(NoRetry),
    FixedBackoff(FixedBackoffRetry),
    ExponentialBackoff(ExponentialBackoffRetry),
    CircuitBreaker(CircuitBreakerStrategy),
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::NoRetry(NoRetry)
    }
}

impl RetryStrategy for Strategy {
    fn allow_request(&self) -> bool {
        match self {
            Strategy::NoRetry(s) => s.allow_request(),
            Strategy::FixedBackoff(s) => s.allow_request(),
            Strategy::ExponentialBackoff(s) => s.allow_request(),
            Strategy::CircuitBreaker(s) => s.allow_request(),
        }
    }

    fn execute<'a, T, E, Fut, Op>(&'a self, operation: Op) -> BoxFuture<'a, Result<T, ResilienceError<E>>>
    where
        T: Send + 'a,
        E: std::error::Error + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send + 'a,
        Op: FnMut() -> Fut + Send + 'a,
    {
        match self {
            Strategy::NoRetry(s) => s.execute(operation),
            Strategy::FixedBackoff(s) => s.execute(operation),
            Strategy::ExponentialBackoff(s) => s.execute(operation),
            Strategy::CircuitBreaker(s) => s.execute(operation),
        }
    }
}

impl From<NoRetry> for Strategy {
    fn from(s: NoRetry) -> Self {
        Strategy::NoRetry(s)
    }
}

impl From<FixedBackoffRetry> for Strategy {
    fn from(s: FixedBackoffRetry) -> Self {
        Strategy::FixedBackoff(s)
    }
}

impl From<ExponentialBackoffRetry> for Strategy {
    fn from(s: ExponentialBackoffRetry) -> Self {
        Strategy::ExponentialBackoff(s)
    }
}

impl From<CircuitBreakerStrategy> for Strategy {
    fn from(s: CircuitBreakerStrategy) -> Self {
        Strategy::CircuitBreaker(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InstantSleeper, TrackingSleeper};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestError(String);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "TestError: {}", self.0)
        }
    }

    impl std::error::Error for TestError {}

    /// Fails the first `failures` attempts, then returns the attempt number.
    async fn flaky<S: RetryStrategy>(
        strategy: &S,
        failures: usize,
    ) -> (Result<usize, ResilienceError<TestError>>, usize) {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let result = strategy
            .execute(move || {
                let counter = counter_clone.clone();
                async move {
                    let attempt = counter.fetch_add(1, Ordering::SeqCst);
                    if attempt < failures {
                        Err(ResilienceError::Inner(TestError(format!("attempt {}", attempt))))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;
        (result, counter.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn no_retry_attempts_once() {
        let (result, attempts) = flaky(&NoRetry, 1).await;
        assert_eq!(attempts, 1);
        assert_eq!(result.unwrap_err().into_inner(), Some(TestError("attempt 0".into())));
        assert!(NoRetry.allow_request());
    }

    #[tokio::test]
    async fn bounded_strategies_retry_exactly_max_then_propagate_last_failure() {
        for max_retries in 0..5 {
            let fixed = FixedBackoffRetry::new(max_retries, Duration::from_millis(5))
                .with_sleeper(InstantSleeper);
            let (result, attempts) = flaky(&fixed, usize::MAX).await;
            assert_eq!(attempts, max_retries + 1);
            assert_eq!(
                result.unwrap_err().into_inner(),
                Some(TestError(format!("attempt {}", max_retries)))
            );

            let exp = ExponentialBackoffRetry::new(max_retries, Duration::from_millis(5))
                .with_sleeper(InstantSleeper);
            let (result, attempts) = flaky(&exp, usize::MAX).await;
            assert_eq!(attempts, max_retries + 1);
            assert!(result.unwrap_err().is_inner());
        }
    }

    #[tokio::test]
    async fn retried_success_is_returned_to_caller() {
        for max_retries in 0..4 {
            for failures in 0..=max_retries {
                let fixed = FixedBackoffRetry::new(max_retries, Duration::from_millis(1))
                    .with_sleeper(InstantSleeper);
                let (result, attempts) = flaky(&fixed, failures).await;
                assert_eq!(result.unwrap(), failures);
                assert_eq!(attempts, failures + 1);

                let exp = ExponentialBackoffRetry::new(max_retries, Duration::from_millis(1))
                    .with_sleeper(InstantSleeper);
                let (result, _) = flaky(&exp, failures).await;
                assert_eq!(result.unwrap(), failures);
            }
        }
    }

    #[tokio::test]
    async fn fixed_backoff_waits_a_constant_interval() {
        let sleeper = TrackingSleeper::new();
        let strategy =
            FixedBackoffRetry::new(3, Duration::from_millis(100)).with_sleeper(sleeper.clone());
        let _ = flaky(&strategy, usize::MAX).await;
        assert_eq!(sleeper.calls(), vec![Duration::from_millis(100); 3]);
    }

    #[tokio::test]
    async fn exponential_backoff_grows_by_attempt_number() {
        let sleeper = TrackingSleeper::new();
        let strategy =
            ExponentialBackoffRetry::new(3, Duration::from_millis(100)).with_sleeper(sleeper.clone());
        let _ = flaky(&strategy, usize::MAX).await;
        assert_eq!(
            sleeper.calls(),
            vec![Duration::from_millis(100), Duration::from_millis(200), Duration::from_millis(300)]
        );
    }

    #[tokio::test]
    async fn geometric_backoff_doubles_and_respects_cap() {
        let sleeper = TrackingSleeper::new();
        let strategy = ExponentialBackoffRetry::new(4, Duration::from_millis(100))
            .geometric()
            .with_max_backoff(Duration::from_millis(500))
            .unwrap()
            .with_sleeper(sleeper.clone());
        let _ = flaky(&strategy, usize::MAX).await;
        assert_eq!(
            sleeper.calls(),
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(500)
            ]
        );
    }

    #[tokio::test]
    async fn jitter_never_exceeds_backoff() {
        let sleeper = TrackingSleeper::new();
        let strategy = FixedBackoffRetry::new(5, Duration::from_millis(100))
            .with_jitter(Jitter::full())
            .with_sleeper(sleeper.clone());
        let _ = flaky(&strategy, usize::MAX).await;
        assert_eq!(sleeper.calls().len(), 5);
        assert!(sleeper.calls().iter().all(|d| *d <= Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn timeouts_are_retried_like_any_failure() {
        let strategy = FixedBackoffRetry::new(2, Duration::ZERO).with_sleeper(InstantSleeper);
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();
        let result = strategy
            .execute(move || {
                let attempts = attempts_clone.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err::<(), ResilienceError<TestError>>(ResilienceError::Timeout {
                        elapsed: Duration::from_millis(2),
                        timeout: Duration::from_millis(1),
                    })
                }
            })
            .await;
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(result.unwrap_err().is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn default_sleeper_waits_on_tokio_time() {
        let strategy = FixedBackoffRetry::new(2, Duration::from_secs(1));
        let start = tokio::time::Instant::now();
        let (result, _) = flaky(&strategy, 2).await;
        assert_eq!(result.unwrap(), 2);
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn strategy_enum_dispatches_to_variant() {
        let strategy: Strategy =
            FixedBackoffRetry::new(1, Duration::ZERO).with_sleeper(InstantSleeper).into();
        let (result, attempts) = flaky(&strategy, 1).await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(attempts, 2);
        assert!(strategy.allow_request());
        assert!(matches!(Strategy::default(), Strategy::NoRetry(_)));
    }
}
