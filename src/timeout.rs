//! Per-attempt deadline scopes.
//!
//! Each run derives a child cancellation scope from the caller's token and races the operation
//! against a deadline timer. The scope is cancelled on every exit path (success, failure, deadline,
//! outer cancellation, or the future being dropped), so transports watching it can abandon work.
//! Sibling runs sharing the same parent are unaffected.

use crate::ResilienceError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    timeout: Duration,
}

impl Deadline {
    /// A zero timeout expires as soon as the operation first yields.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `operation` inside a scope derived from `parent`.
    ///
    /// Deadline expiry yields `Timeout`; cancellation of `parent` yields `Cancelled`.
    pub async fn run<T, E, Fut, Op>(
        &self,
        parent: &CancellationToken,
        operation: Op,
    ) -> Result<T, ResilienceError<E>>
    where
        Fut: Future<Output = Result<T, ResilienceError<E>>>,
        Op: FnOnce(CancellationToken) -> Fut,
    {
        let scope = parent.child_token();
        let _release = scope.clone().drop_guard();
        let start = Instant::now();

        tokio::select! {
            biased;
            _ = parent.cancelled() => Err(ResilienceError::Cancelled),
            result = operation(scope.clone()) => result,
            _ = tokio::time::sleep(self.timeout) => {
                tracing::debug!(target: "lifeline::timeout", timeout = ?self.timeout, "deadline elapsed");
                Err(ResilienceError::Timeout { elapsed: start.elapsed(), timeout: self.timeout })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestError(String);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "TestError: {}", self.0)
        }
    }

    impl std::error::Error for TestError {}

    #[tokio::test(start_paused = true)]
    async fn completes_before_deadline() {
        let deadline = Deadline::new(Duration::from_millis(100));
        let result = deadline
            .run(&CancellationToken::new(), |_| async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, ResilienceError<TestError>>(42)
            })
            .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_operation_times_out_with_details() {
        let deadline = Deadline::new(Duration::from_millis(50));
        let result = deadline
            .run(&CancellationToken::new(), |_| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, ResilienceError<TestError>>(())
            })
            .await;
        let (elapsed, timeout) = result.unwrap_err().timeout_details().expect("timeout error");
        assert_eq!(timeout, Duration::from_millis(50));
        assert!(elapsed >= timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_expires_pending_operation() {
        let result = Deadline::new(Duration::ZERO)
            .run(&CancellationToken::new(), |_| async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, ResilienceError<TestError>>(())
            })
            .await;
        assert!(result.unwrap_err().is_timeout());
    }

    #[tokio::test]
    async fn operation_errors_pass_through() {
        let result = Deadline::new(Duration::from_secs(1))
            .run(&CancellationToken::new(), |_| async {
                Err::<(), _>(ResilienceError::Inner(TestError("boom".into())))
            })
            .await;
        assert_eq!(result.unwrap_err().into_inner(), Some(TestError("boom".into())));
    }

    #[tokio::test]
    async fn cancelled_parent_yields_cancelled() {
        let parent = CancellationToken::new();
        parent.cancel();
        let result = Deadline::new(Duration::from_secs(1))
            .run(&parent, |_| async { Ok::<_, ResilienceError<TestError>>(()) })
            .await;
        assert!(result.unwrap_err().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn scope_is_released_on_deadline() {
        let parent = CancellationToken::new();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let _ = Deadline::new(Duration::from_millis(5))
            .run(&parent, |scope| async move {
                let _ = tx.send(scope.clone());
                scope.cancelled().await;
                Ok::<_, ResilienceError<TestError>>(())
            })
            .await;
        let scope = rx.await.expect("scope handed out");
        assert!(scope.is_cancelled());
        assert!(!parent.is_cancelled(), "parent is never cancelled by a child scope");
    }
}
