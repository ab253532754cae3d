//! Tower integration: wrap any service so each call runs through a [`Strategy`].
//!
//! ```rust
//! use lifeline::prelude::*;
//! use std::time::Duration;
//! use tower::{service_fn, Layer, ServiceExt};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let layer = StrategyLayer::new(FixedBackoffRetry::new(2, Duration::from_millis(10)));
//! let svc = layer.layer(service_fn(|n: u32| async move { Ok::<_, std::io::Error>(n * 2) }));
//! assert_eq!(svc.oneshot(21).await.unwrap(), 42);
//! # });
//! ```

use crate::{ResilienceError, RetryStrategy, Strategy};
use futures::future::BoxFuture;
use std::task::{Context, Poll};
use tower::ServiceExt;
use tower_layer::Layer;
use tower_service::Service;

/// Applies a [`Strategy`] to the wrapped service.
#[derive(Debug, Clone, Default)]
pub struct StrategyLayer {
    strategy: Strategy,
}

impl StrategyLayer {
    pub fn new(strategy: impl Into<Strategy>) -> Self {
        Self { strategy: strategy.into() }
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }
}

impl<S> Layer<S> for StrategyLayer {
    type Service = StrategyService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        StrategyService { inner, strategy: self.strategy.clone() }
    }
}

/// Service produced by [`StrategyLayer`]. Each attempt calls a fresh clone of `inner`.
#[derive(Debug, Clone)]
pub struct StrategyService<S> {
    inner: S,
    strategy: Strategy,
}

impl<S> StrategyService<S> {
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, Request> Service<Request> for StrategyService<S>
where
    Request: Clone + Send + 'static,
    S: Service<Request> + Clone + Send + 'static,
    S::Response: Send + 'static,
    S::Error: std::error::Error + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = ResilienceError<S::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(ResilienceError::Inner)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let strategy = self.strategy.clone();
        let inner = self.inner.clone();
        Box::pin(async move {
            strategy
                .execute(move || {
                    let svc = inner.clone();
                    let req = req.clone();
                    async move { svc.oneshot(req).await.map_err(ResilienceError::Inner) }
                })
                .await
        })
    }
}
