//! Admin API.
//!
//! # Responsibilities
//! - Cache status, loaded routes and (redacted) upstreams
//! - Manual reload
//! - Dry-run routing and expression validation
//!
//! # Design Decisions
//! - Separate listener, bound to loopback by default
//! - Every endpoint requires the bearer API key
//! - A key that expands to nothing refuses to start the admin listener

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use thiserror::Error;

use crate::expr::EnvExpander;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::service::RouteService;

use self::auth::admin_auth_middleware;
use self::handlers::*;

#[derive(Debug, Clone)]
pub struct AdminState {
    pub service: Arc<RouteService>,
    pub api_key: Arc<str>,
}

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("admin.api_key is empty after environment expansion")]
    EmptyApiKey,
}

/// Expand `${NAME}` references in the configured admin key.
pub fn resolve_api_key(env: &EnvExpander, raw: &str) -> Result<Arc<str>, AdminError> {
    let key = env.expand(raw);
    if key.trim().is_empty() {
        return Err(AdminError::EmptyApiKey);
    }
    Ok(Arc::from(key))
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/routes", get(get_routes))
        .route("/admin/upstreams", get(get_upstreams))
        .route("/admin/reload", post(post_reload))
        .route("/admin/test-route", post(post_test_route))
        .route("/admin/validate-expr", post(post_validate_expr))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
        .layer(propagate_request_id_layer())
        .layer(set_request_id_layer())
}
