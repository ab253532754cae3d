//! Compile-time prelude coverage test.
use lifeline::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tower::service_fn;
use tower_layer::Layer;
use tower_service::Service;

#[tokio::test]
async fn prelude_reexports_core_types() {
    let _backoff = Backoff::linear(Duration::from_millis(100));
    let _jitter = Jitter::None;
    let breaker = Arc::new(CircuitBreaker::new());
    assert_eq!(breaker.state(), CircuitState::Closed);

    let layer = StrategyLayer::new(CircuitBreakerStrategy::from_breaker(breaker));
    let mut svc = layer.layer(service_fn(|_req: ()| async { Ok::<_, std::io::Error>(()) }));
    svc.call(()).await.expect("service call failed");

    let client = ResilientClient::no_retry(
        service_fn(|_out: Outbound<()>| async { Ok::<_, std::io::Error>(()) }),
        Duration::from_secs(1),
    );
    client.send((), Some(&RequestOptions::new())).await.expect("send failed");

    let registry: Registry<ResilientClient<_>> = Registry::new();
    assert!(registry.register("default", client));
}
