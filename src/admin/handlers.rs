use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::cache::CacheStatus;
use crate::expr::ExprKind;
use crate::http::request::RequestIdExt;
use crate::http::response::error_response;
use crate::model::{Route, Upstream};
use crate::service::{ServiceError, TestRouteRequest, TestRouteResponse, ValidationResult};

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub cache: CacheStatus,
}

#[derive(Debug, Deserialize)]
pub struct ValidateExprRequest {
    pub expression: String,
    #[serde(default = "default_kind")]
    pub kind: ExprKind,
}

fn default_kind() -> ExprKind {
    ExprKind::Request
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        cache: state.service.status(),
    })
}

/// Enabled routes in load order.
pub async fn get_routes(State(state): State<AdminState>) -> Json<Vec<Route>> {
    Json(
        state
            .service
            .get_routes()
            .iter()
            .map(|r| r.as_ref().clone())
            .collect(),
    )
}

/// Enabled upstreams, credentials redacted, sorted by id.
pub async fn get_upstreams(State(state): State<AdminState>) -> Json<Vec<Upstream>> {
    let mut upstreams: Vec<Upstream> = state
        .service
        .get_upstreams()
        .values()
        .map(|u| u.redacted())
        .collect();
    upstreams.sort_by(|a, b| a.id.cmp(&b.id));
    Json(upstreams)
}

pub async fn post_reload(State(state): State<AdminState>, headers: HeaderMap) -> Response {
    match state.service.reload().await {
        Ok(outcome) => {
            tracing::info!(?outcome, "Reload requested via admin API");
            Json(outcome).into_response()
        }
        Err(e @ ServiceError::ReloadUnavailable) => {
            error_response(StatusCode::CONFLICT, &e.to_string(), headers.request_id())
        }
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string(), headers.request_id()),
    }
}

pub async fn post_test_route(
    State(state): State<AdminState>,
    Json(input): Json<TestRouteRequest>,
) -> Json<TestRouteResponse> {
    Json(state.service.test_route(&input))
}

pub async fn post_validate_expr(
    State(state): State<AdminState>,
    Json(input): Json<ValidateExprRequest>,
) -> Json<ValidationResult> {
    Json(state.service.validate_expr(&input.expression, input.kind))
}
