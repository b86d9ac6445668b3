//! Configuration validation.
//!
//! # Responsibilities
//! - Record invariants checked on every write (pattern, regex, base URL, auth)
//! - Check referential integrity (routes reference existing upstreams)
//! - Syntax-check expressions through the expression engine
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Record checks are shared by the config loader and the route store
//! - Runs before data is accepted into the system, never at match time

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::{HeaderName, Method};
use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;
use crate::expr::{ExprEngine, ExprKind};
use crate::model::{MatchType, MeteringMode, Route, Upstream, UpstreamAuth};
use crate::routing::matcher::compile;

/// A single semantic problem in routes, upstreams or settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{entity} has an empty id")]
    EmptyId { entity: &'static str },

    #[error("duplicate {entity} id '{id}'")]
    DuplicateId { entity: &'static str, id: String },

    #[error("route {route_id}: empty path pattern")]
    EmptyPattern { route_id: String },

    #[error("route {route_id}: invalid regex '{pattern}': {reason}")]
    InvalidRegex {
        route_id: String,
        pattern: String,
        reason: String,
    },

    #[error("route {route_id}: invalid method '{method}'")]
    InvalidMethod { route_id: String, method: String },

    #[error("route {route_id}: references unknown upstream '{upstream_id}'")]
    UnknownUpstream {
        route_id: String,
        upstream_id: String,
    },

    #[error("route {route_id}: {field}: {reason}")]
    InvalidExpression {
        route_id: String,
        field: String,
        reason: String,
    },

    #[error("upstream {upstream_id}: base url '{base_url}' is not an absolute URL: {reason}")]
    InvalidBaseUrl {
        upstream_id: String,
        base_url: String,
        reason: String,
    },

    #[error("upstream {upstream_id}: header auth needs a valid header name")]
    InvalidAuthHeader { upstream_id: String },

    #[error("upstream {upstream_id}: timeout_secs must be greater than zero")]
    ZeroTimeout { upstream_id: String },

    #[error("{field}: {reason}")]
    InvalidSetting { field: &'static str, reason: String },
}

/// One-line rendering of an error list.
pub fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Write-time invariants for a single route.
pub fn validate_route(route: &Route) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if route.id.trim().is_empty() {
        errors.push(ValidationError::EmptyId { entity: "route" });
    }

    if route.path_pattern.is_empty() {
        errors.push(ValidationError::EmptyPattern {
            route_id: route.id.clone(),
        });
    } else if route.match_type == MatchType::Regex {
        // Same compilation the matcher uses, so nothing passes here and fails at build.
        if let Err(e) = compile(&route.path_pattern, MatchType::Regex) {
            errors.push(ValidationError::InvalidRegex {
                route_id: route.id.clone(),
                pattern: route.path_pattern.clone(),
                reason: e.to_string(),
            });
        }
    }

    let methods = route.methods.iter().chain(route.method_override.iter());
    for method in methods {
        if Method::from_bytes(method.trim().as_bytes()).is_err() {
            errors.push(ValidationError::InvalidMethod {
                route_id: route.id.clone(),
                method: method.clone(),
            });
        }
    }

    errors
}

/// Write-time invariants for a single upstream.
pub fn validate_upstream(upstream: &Upstream) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if upstream.id.trim().is_empty() {
        errors.push(ValidationError::EmptyId { entity: "upstream" });
    }

    match Url::parse(&upstream.base_url) {
        Ok(url) if url.cannot_be_a_base() => errors.push(ValidationError::InvalidBaseUrl {
            upstream_id: upstream.id.clone(),
            base_url: upstream.base_url.clone(),
            reason: "URL cannot carry a path".to_string(),
        }),
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::InvalidBaseUrl {
            upstream_id: upstream.id.clone(),
            base_url: upstream.base_url.clone(),
            reason: e.to_string(),
        }),
    }

    if let UpstreamAuth::Header { name, .. } = &upstream.auth {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::InvalidAuthHeader {
                upstream_id: upstream.id.clone(),
            });
        }
    }

    if upstream.timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout {
            upstream_id: upstream.id.clone(),
        });
    }

    errors
}

/// Syntax-check every expression a route carries.
pub fn validate_route_expressions(route: &Route, engine: &dyn ExprEngine) -> Vec<ValidationError> {
    let mut checks: Vec<(String, &str, ExprKind)> = Vec::new();

    if let Some(t) = &route.request_transform {
        for (field, expr) in t.expressions() {
            checks.push((format!("request_transform.{}", field), expr, ExprKind::Request));
        }
    }
    if let Some(t) = &route.response_transform {
        for (field, expr) in t.expressions() {
            checks.push((format!("response_transform.{}", field), expr, ExprKind::Response));
        }
    }
    if let Some(rewrite) = &route.path_rewrite {
        checks.push(("path_rewrite".to_string(), rewrite, ExprKind::PathRewrite));
    }
    let metering_expr = route.metering_expr.trim();
    if !metering_expr.is_empty() && metering_expr.parse::<f64>().is_err() {
        let kind = match route.metering_mode {
            MeteringMode::Request => ExprKind::Metering,
            MeteringMode::Response => ExprKind::Response,
        };
        checks.push(("metering_expr".to_string(), metering_expr, kind));
    }

    checks
        .into_iter()
        .filter_map(|(field, expr, kind)| {
            engine
                .validate(expr, kind)
                .err()
                .map(|e| ValidationError::InvalidExpression {
                    route_id: route.id.clone(),
                    field,
                    reason: e.to_string(),
                })
        })
        .collect()
}

/// Validate the whole configuration, collecting every error.
pub fn validate_config(
    config: &GatewayConfig,
    engine: &dyn ExprEngine,
) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidSetting {
            field: "listener.bind_address",
            reason: format!("'{}' is not a socket address", config.listener.bind_address),
        });
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::InvalidSetting {
            field: "listener.max_body_bytes",
            reason: "must be greater than zero".to_string(),
        });
    }
    if config.cache.refresh_interval_secs == 0 {
        errors.push(ValidationError::InvalidSetting {
            field: "cache.refresh_interval_secs",
            reason: "must be greater than zero".to_string(),
        });
    }
    if config.cache.reload_timeout_secs == 0 {
        errors.push(ValidationError::InvalidSetting {
            field: "cache.reload_timeout_secs",
            reason: "must be greater than zero".to_string(),
        });
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::InvalidSetting {
            field: "timeouts.request_secs",
            reason: "must be greater than zero".to_string(),
        });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidSetting {
            field: "observability.metrics_address",
            reason: format!(
                "'{}' is not a socket address",
                config.observability.metrics_address
            ),
        });
    }
    if config.admin.enabled {
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidSetting {
                field: "admin.bind_address",
                reason: format!("'{}' is not a socket address", config.admin.bind_address),
            });
        }
        if config.admin.api_key.trim().is_empty() {
            errors.push(ValidationError::InvalidSetting {
                field: "admin.api_key",
                reason: "must not be empty".to_string(),
            });
        }
    }

    let mut upstream_ids = HashSet::new();
    for upstream in &config.upstreams {
        errors.extend(validate_upstream(upstream));
        if !upstream_ids.insert(upstream.id.as_str()) {
            errors.push(ValidationError::DuplicateId {
                entity: "upstream",
                id: upstream.id.clone(),
            });
        }
    }

    let mut route_ids = HashSet::new();
    for route in &config.routes {
        errors.extend(validate_route(route));
        errors.extend(validate_route_expressions(&route.normalized(), engine));
        if !route_ids.insert(route.id.as_str()) {
            errors.push(ValidationError::DuplicateId {
                entity: "route",
                id: route.id.clone(),
            });
        }
        if !upstream_ids.contains(route.upstream_id.as_str()) {
            errors.push(ValidationError::UnknownUpstream {
                route_id: route.id.clone(),
                upstream_id: route.upstream_id.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::testing::LiteralEngine;
    use crate::expr::RhaiEngine;
    use crate::model::Transform;

    fn valid_config() -> GatewayConfig {
        GatewayConfig {
            routes: vec![Route::new("users", "/users", "backend")],
            upstreams: vec![Upstream::new("backend", "http://127.0.0.1:3000/")],
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&valid_config(), &LiteralEngine).is_ok());
    }

    #[test]
    fn test_route_invariants() {
        let errors = validate_route(&Route::new("r", "", "u"));
        assert_eq!(errors, vec![ValidationError::EmptyPattern { route_id: "r".into() }]);

        let errors = validate_route(&Route::new("r", "/(unclosed", "u").with_match_type(MatchType::Regex));
        assert!(matches!(errors[0], ValidationError::InvalidRegex { .. }));

        let errors = validate_route(&Route::new("r", "(?x)a #c", "u").with_match_type(MatchType::Regex));
        assert!(matches!(errors[0], ValidationError::InvalidRegex { .. }));

        // Regex syntax is irrelevant for prefix routes.
        assert!(validate_route(&Route::new("r", "/(unclosed", "u")).is_empty());

        let errors = validate_route(&Route::new("r", "/x", "u").with_methods(&["GE T"]));
        assert!(matches!(errors[0], ValidationError::InvalidMethod { .. }));
    }

    #[test]
    fn test_upstream_invariants() {
        let errors = validate_upstream(&Upstream::new("u", "/relative/path"));
        assert!(matches!(errors[0], ValidationError::InvalidBaseUrl { .. }));

        let up = Upstream::new("u", "http://b/").with_auth(UpstreamAuth::Header {
            name: String::new(),
            value: "v".into(),
        });
        assert_eq!(
            validate_upstream(&up),
            vec![ValidationError::InvalidAuthHeader { upstream_id: "u".into() }]
        );
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = valid_config();
        config.listener.bind_address = "nowhere".into();
        config.routes.push(Route::new("users", "", "missing"));
        config.upstreams.push(Upstream::new("backend", "not a url"));

        let errors = validate_config(&config, &LiteralEngine).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidSetting { field: "listener.bind_address", .. })));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::EmptyPattern { .. })));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::DuplicateId { entity: "route", .. })));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::DuplicateId { entity: "upstream", .. })));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::UnknownUpstream { .. })));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidBaseUrl { .. })));
    }

    #[test]
    fn test_expression_errors_reported_per_field() {
        let mut route = Route::new("r", "/x", "backend");
        let mut t = Transform::default();
        t.set_headers.insert("X-Ok".into(), "method".into());
        t.set_headers.insert("X-Status".into(), "status".into());
        route.request_transform = Some(t);
        route.metering_expr = "body_size +".into();

        let errors = validate_route_expressions(&route, &RhaiEngine::default());
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| matches!(
            e,
            ValidationError::InvalidExpression { field, .. } if field == "request_transform.set_headers.X-Status"
        )));
        assert!(errors.iter().any(|e| matches!(
            e,
            ValidationError::InvalidExpression { field, .. } if field == "metering_expr"
        )));
    }

    #[test]
    fn test_response_metering_sees_response_vars() {
        let mut route = Route::new("r", "/x", "backend");
        route.metering_expr = "response_size".into();
        assert_eq!(validate_route_expressions(&route, &RhaiEngine::default()).len(), 1);

        route.metering_mode = MeteringMode::Response;
        assert!(validate_route_expressions(&route, &RhaiEngine::default()).is_empty());
    }
}
