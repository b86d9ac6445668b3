//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use apigate::cache::{CacheSettings, ConfigCache, MemoryStore};
use apigate::expr::{EnvExpander, MapEnv, RhaiEngine};
use apigate::metering::{UsageRecord, UsageSink};
use apigate::{GatewayConfig, HttpServer, RouteService, Shutdown};
use axum::body::Bytes;
use axum::http::{HeaderMap, Method, Uri};
use axum::response::IntoResponse;
use axum::{Json, Router};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Start a backend that answers every request with a JSON description of it.
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().fallback(echo);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    let headers: BTreeMap<String, String> = headers
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
        .collect();
    (
        [("x-backend", "echo")],
        Json(json!({
            "method": method.as_str(),
            "path": uri.path(),
            "query": uri.query().unwrap_or_default(),
            "headers": headers,
            "body": String::from_utf8_lossy(&body),
        })),
    )
}

/// Start a programmable mock backend with async support.
///
/// The closure decides status and body; it may sleep to simulate latency.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        read_request_head(&mut socket).await;
                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });
    addr
}

async fn read_request_head(socket: &mut tokio::net::TcpStream) {
    let mut seen = Vec::new();
    let mut buf = [0u8; 1024];
    while !seen.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => seen.extend_from_slice(&buf[..n]),
        }
    }
}

/// Usage sink that keeps every record for assertions.
#[derive(Debug, Default)]
pub struct CollectingSink {
    records: Mutex<Vec<UsageRecord>>,
}

impl CollectingSink {
    pub fn records(&self) -> Vec<UsageRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl UsageSink for CollectingSink {
    fn record(&self, record: UsageRecord) {
        self.records.lock().unwrap().push(record);
    }
}

/// A running gateway on an ephemeral port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub store: Arc<MemoryStore>,
    pub cache: Arc<ConfigCache>,
    pub service: Arc<RouteService>,
    pub usage: Arc<CollectingSink>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn start_gateway(config: GatewayConfig, env: MapEnv) -> TestGateway {
    let store = Arc::new(MemoryStore::seeded(config.routes.clone(), config.upstreams.clone()).unwrap());
    let cache = Arc::new(ConfigCache::from_store(
        store.clone(),
        CacheSettings::from(&config.cache),
    ));
    cache.start().await.unwrap();

    let service = Arc::new(RouteService::from_cache(
        cache.clone(),
        Arc::new(RhaiEngine::default()),
        EnvExpander::new(Arc::new(env)),
    ));
    let usage = Arc::new(CollectingSink::default());
    let server = HttpServer::new(&config, service.clone(), usage.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    TestGateway {
        addr,
        shutdown,
        store,
        cache,
        service,
        usage,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
