//! Failure injection tests for the gateway.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use apigate::expr::MapEnv;
use apigate::model::{Route, Upstream};
use apigate::GatewayConfig;
use axum::http::StatusCode;
use serde_json::Value;

mod common;

fn single_route(upstream: Upstream) -> GatewayConfig {
    GatewayConfig {
        routes: vec![Route::new("r1", "/", upstream.id.clone())],
        upstreams: vec![upstream],
        ..Default::default()
    }
}

#[tokio::test]
async fn test_upstream_timeout_returns_504() {
    let backend = common::start_programmable_backend(|| async {
        tokio::time::sleep(Duration::from_secs(3)).await;
        (200, "late".into())
    })
    .await;

    let mut upstream = Upstream::new("slow", format!("http://{}/", backend));
    upstream.timeout_secs = 1;
    let gw = common::start_gateway(single_route(upstream), MapEnv::new()).await;

    let res = common::client().get(gw.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "upstream timed out");
    assert!(gw.usage.records().is_empty());

    gw.shutdown.trigger();
}

#[tokio::test]
async fn test_unreachable_upstream_returns_502() {
    // Bind then drop to get a port nothing listens on.
    let closed: SocketAddr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let upstream = Upstream::new("gone", format!("http://{}/", closed));
    let gw = common::start_gateway(single_route(upstream), MapEnv::new()).await;

    let res = common::client().get(gw.url("/anything")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);

    gw.shutdown.trigger();
}

#[tokio::test]
async fn test_upstream_errors_pass_through() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let backend = common::start_programmable_backend(move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            (503, "Service Unavailable".into())
        }
    })
    .await;

    let upstream = Upstream::new("flaky", format!("http://{}/", backend));
    let gw = common::start_gateway(single_route(upstream), MapEnv::new()).await;

    let res = common::client().get(gw.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.text().await.unwrap(), "Service Unavailable");
    // No retries: exactly one upstream call.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(gw.usage.records()[0].status, 503);

    gw.shutdown.trigger();
}

#[tokio::test]
async fn test_failed_expressions_do_not_fail_requests() {
    let backend = common::start_echo_backend().await;

    let mut route = Route::new("r1", "/", "backend");
    route.path_rewrite = Some("undefined_variable + 1".into());
    route.metering_expr = "body_size / 0.0".into();
    let config = GatewayConfig {
        routes: vec![route],
        upstreams: vec![Upstream::new("backend", format!("http://{}/", backend))],
        ..Default::default()
    };
    let gw = common::start_gateway(config, MapEnv::new()).await;

    let res = common::client().get(gw.url("/kept/path")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let echoed: Value = res.json().await.unwrap();
    assert_eq!(echoed["path"], "/kept/path");
    assert_eq!(gw.usage.records()[0].value, 1.0);

    gw.shutdown.trigger();
}

#[tokio::test]
async fn test_reload_swaps_routes_without_dropping_traffic() {
    let backend = common::start_echo_backend().await;
    let upstream = Upstream::new("backend", format!("http://{}/", backend));
    let config = GatewayConfig {
        routes: vec![Route::new("old", "/old", "backend")],
        upstreams: vec![upstream.clone()],
        ..Default::default()
    };
    let gw = common::start_gateway(config, MapEnv::new()).await;
    let client = common::client();

    assert_eq!(client.get(gw.url("/new")).send().await.unwrap().status(), StatusCode::NOT_FOUND);

    gw.store
        .replace_all(vec![Route::new("new", "/new", "backend")], vec![upstream])
        .unwrap();
    gw.service.reload().await.unwrap();
    assert_eq!(gw.cache.generation(), 2);

    assert_eq!(client.get(gw.url("/new")).send().await.unwrap().status(), StatusCode::OK);
    assert_eq!(client.get(gw.url("/old")).send().await.unwrap().status(), StatusCode::NOT_FOUND);

    gw.shutdown.trigger();
}
