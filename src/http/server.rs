//! HTTP server setup and the forwarding handler.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all proxy handler
//! - Wire up middleware (tracing, timeout, request ID)
//! - Bind server to listener, stop on the shutdown broadcast
//! - Match, prepare and forward requests to upstreams
//! - Apply response transforms and emit usage records
//! - Observability (metrics, correlation IDs)
//!
//! # Design Decisions
//! - One snapshot per request: matching, upstream lookup and client
//!   selection always agree even across a reload
//! - Bodies stream through unless a response transform or response
//!   metering needs the whole payload
//! - Usage is recorded only when an upstream answered

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Request, StatusCode},
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::cache::clock::unix_millis;
use crate::config::GatewayConfig;
use crate::expr::{RequestContext, ResponseContext};
use crate::http::request::{
    propagate_request_id_layer, read_body, set_request_id_layer, strip_hop_by_hop, BodyError,
    RequestIdExt, X_REQUEST_ID,
};
use crate::http::response::{buffered_response, downstream_headers, error_response, streamed_response};
use crate::metering::{UsageRecord, UsageSink};
use crate::model::{MeteringMode, Protocol, Route};
use crate::observability::metrics;
use crate::service::{PrepareError, PreparedRequest, RouteService};

/// Application state injected into handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub service: Arc<RouteService>,
    pub usage: Arc<dyn UsageSink>,
    pub max_body_bytes: usize,
    pub metering_enabled: bool,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &GatewayConfig, service: Arc<RouteService>, usage: Arc<dyn UsageSink>) -> Self {
        let state = AppState {
            service,
            usage,
            max_body_bytes: config.listener.max_body_bytes,
            metering_enabled: config.metering.enabled,
        };
        let router = Self::build_router(Duration::from_secs(config.timeouts.request_secs), state);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(request_timeout: Duration, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(request_timeout))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    request_id = %request.headers().request_id(),
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }))
            .layer(set_request_id_layer())
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until the shutdown broadcast fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler.
/// Matches a route, prepares the outbound request and forwards it.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let (parts, body) = request.into_parts();
    let request_id = parts.headers.request_id().to_string();
    let method = parts.method.as_str().to_string();
    let path = parts.uri.path().to_string();

    tracing::debug!(request_id = %request_id, method = %method, path = %path, "Proxying request");

    // 1. Match route against this request's snapshot
    let snapshot = state.service.snapshot();
    let Some(matched) = snapshot.match_request(&method, &path, &parts.headers) else {
        tracing::warn!(request_id = %request_id, path = %path, "No route matched");
        metrics::record_request(&method, 404, "none", start_time);
        return error_response(StatusCode::NOT_FOUND, "no route matched", &request_id);
    };
    let route = matched.route.clone();

    if route.protocol == Protocol::Websocket {
        metrics::record_request(&method, 501, &route.id, start_time);
        return error_response(
            StatusCode::NOT_IMPLEMENTED,
            "websocket forwarding is not supported",
            &request_id,
        );
    }

    // 2. Buffer body within the limit
    let body = match read_body(&parts.headers, body, state.max_body_bytes).await {
        Ok(body) => body,
        Err(BodyError::TooLarge) => {
            metrics::record_request(&method, 413, &route.id, start_time);
            return error_response(StatusCode::PAYLOAD_TOO_LARGE, "request body too large", &request_id);
        }
        Err(BodyError::Unreadable) => {
            metrics::record_request(&method, 400, &route.id, start_time);
            return error_response(StatusCode::BAD_REQUEST, "request body unreadable", &request_id);
        }
    };

    let req = RequestContext::new(method.clone(), path)
        .with_params(matched.params)
        .with_query(parts.uri.query())
        .with_headers(parts.headers)
        .with_body(body);

    // 3. Rewrite, transform, resolve and authenticate
    let prepared = match state.service.prepare(&snapshot, route.clone(), &req) {
        Ok(prepared) => prepared,
        Err(e) => {
            let status = match e {
                PrepareError::UpstreamUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                PrepareError::Resolve(_) => StatusCode::BAD_GATEWAY,
            };
            tracing::warn!(request_id = %request_id, route_id = %route.id, error = %e, "Request could not be prepared");
            metrics::record_request(&method, status.as_u16(), &route.id, start_time);
            return error_response(status, &e.to_string(), &request_id);
        }
    };

    let Some(client) = snapshot.clients.get(&prepared.upstream.id) else {
        metrics::record_request(&method, 503, &route.id, start_time);
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "upstream client unavailable", &request_id);
    };

    let Ok(outbound_method) = reqwest::Method::from_bytes(prepared.method.as_bytes()) else {
        metrics::record_request(&method, 502, &route.id, start_time);
        return error_response(StatusCode::BAD_GATEWAY, "invalid outbound method", &request_id);
    };

    // 4. Forward
    let headers = outbound_headers(&prepared, &request_id);
    let upstream_response = match client
        .client
        .request(outbound_method, prepared.url.clone())
        .headers(headers)
        .body(prepared.body.clone())
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            let status = if e.is_timeout() {
                StatusCode::GATEWAY_TIMEOUT
            } else {
                StatusCode::BAD_GATEWAY
            };
            tracing::error!(
                request_id = %request_id,
                upstream_id = %prepared.upstream.id,
                error = %e,
                "Upstream error"
            );
            metrics::record_request(&method, status.as_u16(), &route.id, start_time);
            let message = if e.is_timeout() {
                "upstream timed out"
            } else {
                "upstream request failed"
            };
            return error_response(status, message, &request_id);
        }
    };

    let status = upstream_response.status();
    let response_headers = downstream_headers(upstream_response.headers());
    let needs_body = route.response_transform.is_some()
        || (state.metering_enabled && route.metering_mode == MeteringMode::Response);

    // 5. Stream through, or buffer for transform and metering
    let response = if needs_body {
        let body = match upstream_response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(request_id = %request_id, error = %e, "Upstream body read failed");
                metrics::record_request(&method, 502, &route.id, start_time);
                return error_response(StatusCode::BAD_GATEWAY, "upstream body read failed", &request_id);
            }
        };
        let upstream_ctx = ResponseContext {
            status: status.as_u16(),
            headers: response_headers,
            body,
        };
        record_usage(&state, &route, &req, Some(&upstream_ctx), status, &request_id);

        let out = state
            .service
            .apply_response_transform(route.response_transform.as_ref(), &req, &upstream_ctx);
        buffered_response(status, out.headers, out.body)
    } else {
        record_usage(&state, &route, &req, None, status, &request_id);
        streamed_response(
            status,
            response_headers,
            Body::from_stream(upstream_response.bytes_stream()),
        )
    };

    metrics::record_request(&method, status.as_u16(), &route.id, start_time);
    response
}

/// Prepared headers minus hop-by-hop fields, keeping injected credentials.
fn outbound_headers(prepared: &PreparedRequest, request_id: &str) -> HeaderMap {
    let mut headers = prepared.headers.clone();
    let credential = prepared
        .auth_header
        .as_ref()
        .and_then(|name| headers.get(name).map(|v| (name.clone(), v.clone())));

    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);

    if let Some((name, value)) = credential {
        headers.insert(name, value);
    }
    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert(X_REQUEST_ID, value);
    }
    headers
}

fn record_usage(
    state: &AppState,
    route: &Route,
    req: &RequestContext,
    resp: Option<&ResponseContext>,
    status: StatusCode,
    request_id: &str,
) {
    if !state.metering_enabled {
        return;
    }
    let outcome = state.service.meter(route, req, resp);
    state.usage.record(UsageRecord {
        request_id: request_id.to_string(),
        route_id: route.id.clone(),
        upstream_id: route.upstream_id.clone(),
        unit: route.metering_unit.clone(),
        value: outcome.value,
        status: status.as_u16(),
        recorded_at: unix_millis(SystemTime::now()),
    });
}
