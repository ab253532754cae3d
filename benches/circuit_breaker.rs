use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lifeline::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStrategy, StrategyLayer,
};

use futures::future::Ready;
use std::sync::Arc;
use std::time::Duration;
use tower::{Service, ServiceBuilder};

// Returns its input; keeps the transport out of the measurement.
#[derive(Clone)]
struct EchoService;

impl Service<&'static str> for EchoService {
    type Response = &'static str;
    type Error = std::io::Error;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: &'static str) -> Self::Future {
        futures::future::ready(Ok(req))
    }
}

#[derive(Clone)]
struct FailingService;

impl Service<&'static str> for FailingService {
    type Response = &'static str;
    type Error = std::io::Error;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: &'static str) -> Self::Future {
        futures::future::ready(Err(std::io::Error::new(std::io::ErrorKind::Other, "boom")))
    }
}

fn breaker(threshold: usize) -> Arc<CircuitBreaker> {
    let config = CircuitBreakerConfig::new(threshold, Duration::from_secs(30), Duration::from_secs(300))
        .unwrap();
    Arc::new(CircuitBreaker::with_config(config))
}

fn breaker_hot_path(c: &mut Criterion) {
    let closed = breaker(usize::MAX);
    c.bench_function("breaker_allow_request_closed", |b| {
        b.iter(|| black_box(closed.allow_request()));
    });

    let open = breaker(1);
    let _ = open.mark_failure();
    c.bench_function("breaker_mark_failure_open", |b| {
        b.iter(|| black_box(open.mark_failure()));
    });
}

fn strategy_layer_success(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let layer = StrategyLayer::new(CircuitBreakerStrategy::from_breaker(breaker(10)));
    let svc = ServiceBuilder::new().layer(layer).service(EchoService);

    c.bench_function("strategy_layer_breaker_success", |b| {
        b.to_async(&rt).iter(|| async {
            let mut local_svc = svc.clone();
            let _ = black_box(local_svc.call(black_box("request"))).await;
        });
    });
}

fn strategy_layer_rejected(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let layer = StrategyLayer::new(CircuitBreakerStrategy::from_breaker(breaker(1)));
    let svc = ServiceBuilder::new().layer(layer).service(FailingService);

    c.bench_function("strategy_layer_breaker_open", |b| {
        b.to_async(&rt).iter(|| async {
            let mut local_svc = svc.clone();
            let _ = black_box(local_svc.call(black_box("request"))).await;
        });
    });
}

criterion_group!(benches, breaker_hot_path, strategy_layer_success, strategy_layer_rejected);
criterion_main!(benches);
