//! Execution wrapper: a transport plus a retry strategy, per-attempt deadlines and headers.
//!
//! The transport is any [`tower::Service`] taking an [`Outbound`] request. `lifeline` does not care
//! what goes over the wire; it only decides how often and for how long the transport is called.
//!
//! ```rust
//! use lifeline::prelude::*;
//! use std::time::Duration;
//! use tower::service_fn;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let transport = service_fn(|out: Outbound<&'static str>| async move {
//!     Ok::<_, std::io::Error>(format!("GET {} ({} headers)", out.request, out.headers.len()))
//! });
//! let client = ResilientClient::fixed_backoff(transport, Duration::from_secs(5), 3, Duration::from_millis(200));
//! let options = RequestOptions::new()
//!     .with_headers(|| vec![Header::single("x-correlation-id", "C8B8D900").unwrap()]);
//! let body = client.send("https://example.com", Some(&options)).await.unwrap();
//! assert_eq!(body, "GET https://example.com (1 headers)");
//! # });
//! ```

use crate::circuit_breaker::Breaker;
use crate::timeout::Deadline;
use crate::{
    CircuitBreakerStrategy, ExponentialBackoffRetry, FixedBackoffRetry, NoRetry, ResilienceError,
    RetryStrategy, Strategy,
};
use arc_swap::ArcSwap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceExt};
use tracing::{debug, info};

/// Timeout applied when neither the client nor the call specifies one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(100);

/// Errors building a [`Header`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeaderError {
    #[error("header name must not be blank")]
    BlankName,
}

/// A header name with its ordered values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Header {
    name: String,
    values: Vec<String>,
}

impl Header {
    pub fn new<I, V>(name: impl Into<String>, values: I) -> Result<Self, HeaderError>
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(HeaderError::BlankName);
        }
        Ok(Self { name, values: values.into_iter().map(Into::into).collect() })
    }

    pub fn single(name: impl Into<String>, value: impl Into<String>) -> Result<Self, HeaderError> {
        Self::new(name, [value.into()])
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }
}

/// Callback producing extra headers; evaluated once per call.
pub type HeaderFn = Arc<dyn Fn() -> Vec<Header> + Send + Sync>;

/// Per-call overrides.
#[derive(Clone, Default)]
pub struct RequestOptions {
    strategy: Option<Strategy>,
    timeout: Option<Duration>,
    headers: Option<HeaderFn>,
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("strategy", &self.strategy)
            .field("timeout", &self.timeout)
            .field("headers", &self.headers.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this strategy instead of the client's.
    pub fn with_strategy(mut self, strategy: impl Into<Strategy>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }

    /// Per-attempt deadline for this call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Headers appended after the client's defaults.
    pub fn with_headers<F>(mut self, headers: F) -> Self
    where
        F: Fn() -> Vec<Header> + Send + Sync + 'static,
    {
        self.headers = Some(Arc::new(headers));
        self
    }

    pub fn strategy(&self) -> Option<&Strategy> {
        self.strategy.as_ref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// What the transport receives for each attempt.
#[derive(Debug, Clone)]
pub struct Outbound<R> {
    pub request: R,
    pub headers: Vec<Header>,
    /// Cancelled when the attempt's deadline passes or the call is abandoned.
    pub cancel: CancellationToken,
}

/// A transport wrapped with a retry strategy and deadlines.
pub struct ResilientClient<S> {
    service: S,
    strategy: Strategy,
    timeout: ArcSwap<Duration>,
    default_headers: ArcSwap<Vec<Header>>,
    pending: ArcSwap<CancellationToken>,
}

impl<S> fmt::Debug for ResilientClient<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientClient")
            .field("strategy", &self.strategy)
            .field("timeout", &self.timeout())
            .field("default_headers", &self.default_headers.load_full())
            .finish_non_exhaustive()
    }
}

impl<S> ResilientClient<S> {
    pub fn new(service: S, strategy: impl Into<Strategy>, timeout: Duration) -> Self {
        Self {
            service,
            strategy: strategy.into(),
            timeout: ArcSwap::from_pointee(timeout),
            default_headers: ArcSwap::from_pointee(Vec::new()),
            pending: ArcSwap::from_pointee(CancellationToken::new()),
        }
    }

    /// Single attempt per call.
    pub fn no_retry(service: S, timeout: Duration) -> Self {
        Self::new(service, NoRetry, timeout)
    }

    pub fn fixed_backoff(service: S, timeout: Duration, max_retries: usize, backoff: Duration) -> Self {
        Self::new(service, FixedBackoffRetry::new(max_retries, backoff), timeout)
    }

    pub fn exponential_backoff(
        service: S,
        timeout: Duration,
        max_retries: usize,
        backoff: Duration,
    ) -> Self {
        Self::new(service, ExponentialBackoffRetry::new(max_retries, backoff), timeout)
    }

    /// Guard calls with a breaker shared with the caller.
    pub fn circuit_breaker(service: S, timeout: Duration, breaker: Arc<dyn Breaker>) -> Self {
        Self::new(service, CircuitBreakerStrategy::new(breaker), timeout)
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Admission check of the default strategy. With a breaker this may use up an open probe.
    pub fn allow_request(&self) -> bool {
        self.strategy.allow_request()
    }

    pub fn timeout(&self) -> Duration {
        **self.timeout.load()
    }

    /// Applies to calls started afterwards.
    pub fn set_timeout(&self, timeout: Duration) {
        self.timeout.store(Arc::new(timeout));
    }

    pub fn default_headers(&self) -> Arc<Vec<Header>> {
        self.default_headers.load_full()
    }

    pub fn set_default_headers(&self, headers: Vec<Header>) {
        self.default_headers.store(Arc::new(headers));
    }

    pub fn add_default_header(&self, header: Header) {
        self.default_headers.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(header.clone());
            next
        });
    }

    /// Cancel every call currently in flight on this client. Later calls are unaffected.
    pub fn cancel_pending_requests(&self) {
        let previous = self.pending.swap(Arc::new(CancellationToken::new()));
        previous.cancel();
        info!(target: "lifeline::client", "pending requests cancelled");
    }

    /// Send `request` through the strategy.
    pub async fn send<R>(
        &self,
        request: R,
        options: Option<&RequestOptions>,
    ) -> Result<S::Response, ResilienceError<S::Error>>
    where
        R: Clone + Send + Sync,
        S: Service<Outbound<R>> + Clone + Send + Sync,
        S::Response: Send,
        S::Error: std::error::Error + Send + Sync + 'static,
        S::Future: Send,
    {
        let strategy = options.and_then(RequestOptions::strategy).unwrap_or(&self.strategy);
        let deadline =
            Deadline::new(options.and_then(RequestOptions::timeout).unwrap_or_else(|| self.timeout()));
        let mut headers = Vec::clone(&self.default_headers.load());
        if let Some(extra) = options.and_then(|o| o.headers.as_ref()) {
            headers.extend(extra());
        }
        let parent = self.pending.load_full();
        debug!(
            target: "lifeline::client",
            timeout = ?deadline.timeout(),
            headers = headers.len(),
            "sending request"
        );

        let service = &self.service;
        let request = &request;
        let headers = &headers;
        let parent = &parent;
        strategy
            .execute(move || {
                let service = service.clone();
                let request = request.clone();
                let headers = headers.clone();
                async move {
                    deadline
                        .run(parent, |cancel| async move {
                            service
                                .oneshot(Outbound { request, headers, cancel })
                                .await
                                .map_err(ResilienceError::Inner)
                        })
                        .await
                }
            })
            .await
    }

    /// Like [`send`](Self::send), but also abandoned when `cancel` fires.
    pub async fn send_with_cancel<R>(
        &self,
        request: R,
        cancel: &CancellationToken,
        options: Option<&RequestOptions>,
    ) -> Result<S::Response, ResilienceError<S::Error>>
    where
        R: Clone + Send + Sync,
        S: Service<Outbound<R>> + Clone + Send + Sync,
        S::Response: Send,
        S::Error: std::error::Error + Send + Sync + 'static,
        S::Future: Send,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ResilienceError::Cancelled),
            result = self.send(request, options) => result,
        }
    }
}
