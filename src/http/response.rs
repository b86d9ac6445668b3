//! Response construction.
//!
//! # Responsibilities
//! - Gateway-generated error bodies (JSON, with request ID)
//! - Convert upstream responses into downstream responses
//!
//! # Design Decisions
//! - Error bodies carry the request ID for correlation with logs
//! - Hop-by-hop headers from the upstream never reach the client
//! - A rewritten body drops the upstream `Content-Length`

use axum::body::Body;
use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::Serialize;

use crate::http::request::{strip_hop_by_hop, X_REQUEST_ID};

/// JSON body of every gateway-generated error.
#[derive(Debug, Serialize)]
pub struct ErrorBody<'a> {
    pub error: &'a str,
    pub request_id: &'a str,
}

pub fn error_response(status: StatusCode, message: &str, request_id: &str) -> Response {
    let mut response = (
        status,
        Json(ErrorBody {
            error: message,
            request_id,
        }),
    )
        .into_response();
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }
    response
}

/// Headers safe to return to the client.
pub fn downstream_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = upstream.clone();
    strip_hop_by_hop(&mut headers);
    headers
}

/// Response with a body the gateway produced or rewrote.
pub fn buffered_response(status: StatusCode, mut headers: HeaderMap, body: Bytes) -> Response {
    headers.remove(header::CONTENT_LENGTH);
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Response whose body is passed through as it arrives.
pub fn streamed_response(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
