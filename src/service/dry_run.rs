//! Dry-run routing and expression validation for admin tooling.

use std::collections::BTreeMap;

use axum::http::header::{HeaderName, HeaderValue};
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::expr::{ExprKind, RequestContext, ResponseContext};
use crate::metering::MeteringOutcome;
use crate::model::{MeteringMode, REDACTED};
use crate::service::route_service::RouteService;

/// A request-like input for [`RouteService::test_route`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TestRouteRequest {
    pub method: String,
    /// Path, optionally followed by `?query`.
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

impl TestRouteRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// What the gateway would do with a request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TestRouteResponse {
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_name: Option<String>,
    pub path_params: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Outbound headers. Failed expressions appear as their raw text and the
    /// credential header is redacted.
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metering_expr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metering_unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metering_value: Option<f64>,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of [`RouteService::validate_expr`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RouteService {
    /// Run matching and the request pipeline without forwarding anything.
    pub fn test_route(&self, input: &TestRouteRequest) -> TestRouteResponse {
        let mut out = TestRouteResponse::default();

        let (path, query) = match input.path.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (input.path.as_str(), None),
        };
        let method = if input.method.trim().is_empty() {
            "GET".to_string()
        } else {
            input.method.trim().to_ascii_uppercase()
        };

        let mut headers = HeaderMap::new();
        for (name, value) in &input.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(n), Ok(v)) => {
                    headers.append(n, v);
                }
                _ => out.warnings.push(format!("ignored invalid header '{}'", name)),
            }
        }

        let snapshot = self.snapshot();
        let Some(matched) = snapshot.match_request(&method, path, &headers) else {
            out.error = Some("no route matched".to_string());
            return out;
        };

        let route = matched.route.clone();
        out.matched = true;
        out.route_id = Some(route.id.clone());
        out.route_name = Some(route.name.clone());
        out.path_params = matched.params.clone();
        out.upstream_id = Some(route.upstream_id.clone());
        out.metering_expr = Some(route.metering_expr.clone());
        out.metering_unit = Some(route.metering_unit.clone());

        let req = RequestContext::new(method, path)
            .with_params(matched.params)
            .with_query(query)
            .with_headers(headers)
            .with_body(input.body.clone().unwrap_or_default());

        let prepared = match self.prepare(&snapshot, route.clone(), &req) {
            Ok(p) => p,
            Err(e) => {
                out.error = Some(e.to_string());
                return out;
            }
        };

        out.upstream_url = Some(prepared.url.to_string());
        out.method = Some(prepared.method.clone());
        out.path = Some(prepared.path.clone());
        out.body = Some(String::from_utf8_lossy(&prepared.body).into_owned());
        for (name, value) in prepared.headers.iter() {
            let shown = if Some(name) == prepared.auth_header.as_ref() {
                REDACTED.to_string()
            } else {
                String::from_utf8_lossy(value.as_bytes()).into_owned()
            };
            out.headers
                .entry(name.as_str().to_string())
                .and_modify(|v| {
                    v.push_str(", ");
                    v.push_str(&shown);
                })
                .or_insert(shown);
        }

        for failure in &prepared.errors {
            out.warnings.push(format!(
                "{}: {} (expression: {})",
                failure.field, failure.error, failure.expression
            ));
            if let Some(name) = failure.field.strip_prefix("set_headers.") {
                out.headers
                    .insert(name.to_ascii_lowercase(), failure.expression.clone());
            } else if failure.field == "body_expr" {
                out.body = Some(failure.expression.clone());
            } else if failure.field == "path_rewrite" {
                out.path = Some(failure.expression.clone());
            }
        }

        let outcome = match route.metering_mode {
            MeteringMode::Request => self.meter(&route, &req, None),
            MeteringMode::Response => {
                out.warnings
                    .push("metering evaluated against an empty 200 response".to_string());
                let sample = ResponseContext {
                    status: 200,
                    ..Default::default()
                };
                self.meter(&route, &req, Some(&sample))
            }
        };
        record_metering(&mut out, outcome);
        out
    }

    /// Syntax-check an expression for the given context kind.
    pub fn validate_expr(&self, expr: &str, kind: ExprKind) -> ValidationResult {
        match self.engine().validate(expr, kind) {
            Ok(()) => ValidationResult {
                valid: true,
                error: None,
            },
            Err(e) => ValidationResult {
                valid: false,
                error: Some(e.to_string()),
            },
        }
    }
}

fn record_metering(out: &mut TestRouteResponse, outcome: MeteringOutcome) {
    if let Some(error) = outcome.error {
        out.warnings
            .push(format!("metering_expr: {} (reported as default)", error));
    }
    out.metering_value = Some(outcome.value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::StaticSnapshot;
    use crate::expr::testing::LiteralEngine;
    use crate::expr::{EnvExpander, MapEnv, RhaiEngine};
    use crate::model::{MatchType, Route, Transform, Upstream, UpstreamAuth};
    use std::sync::Arc;

    fn service_with(engine: Arc<dyn crate::expr::ExprEngine>, routes: Vec<Route>) -> RouteService {
        let upstream = Upstream::new("backend", "https://api.internal/").with_auth(UpstreamAuth::Bearer {
            value: "${TOKEN}".into(),
        });
        RouteService::new(
            Arc::new(StaticSnapshot::from_records(routes, vec![upstream]).unwrap()),
            engine,
            EnvExpander::new(Arc::new(MapEnv::new().with("TOKEN", "s3cret"))),
        )
    }

    #[test]
    fn test_dry_run_match_and_redaction() {
        let route = Route::new("users", "/users/{id}", "backend").with_match_type(MatchType::Exact);
        let svc = service_with(Arc::new(LiteralEngine), vec![route]);

        let res = svc.test_route(&TestRouteRequest::new("get", "/users/42?expand=1"));
        assert!(res.matched);
        assert_eq!(res.route_id.as_deref(), Some("users"));
        assert_eq!(res.path_params.get("id").map(String::as_str), Some("42"));
        assert_eq!(res.method.as_deref(), Some("GET"));
        assert_eq!(
            res.upstream_url.as_deref(),
            Some("https://api.internal/users/42?expand=1")
        );
        assert_eq!(res.headers.get("authorization").map(String::as_str), Some(REDACTED));
        assert_eq!(res.metering_value, Some(1.0));
        assert!(res.warnings.is_empty());
        assert!(!serde_json::to_string(&res).unwrap().contains("s3cret"));
    }

    #[test]
    fn test_dry_run_shows_failed_expressions_verbatim() {
        let mut route = Route::new("r", "/", "backend");
        let mut t = Transform::default();
        t.set_headers.insert("X-Good".into(), "'ok'".into());
        t.set_headers.insert("X-Bad".into(), "<malformed expr".into());
        t.body_expr = Some("<also bad".into());
        route.request_transform = Some(t);
        route.metering_expr = "<nope".into();
        let svc = service_with(Arc::new(LiteralEngine), vec![route]);

        let res = svc.test_route(&TestRouteRequest::new("POST", "/x").with_body("{}"));
        assert_eq!(res.headers.get("x-good").map(String::as_str), Some("ok"));
        assert_eq!(res.headers.get("x-bad").map(String::as_str), Some("<malformed expr"));
        assert_eq!(res.body.as_deref(), Some("<also bad"));
        assert_eq!(res.metering_value, Some(1.0));
        assert_eq!(res.warnings.len(), 3);
        assert!(res.error.is_none());
    }

    #[test]
    fn test_dry_run_no_match_and_disabled() {
        let svc = service_with(
            Arc::new(LiteralEngine),
            vec![Route::new("off", "/", "backend").disabled()],
        );
        let res = svc.test_route(&TestRouteRequest::new("GET", "/"));
        assert!(!res.matched);
        assert_eq!(res.error.as_deref(), Some("no route matched"));
    }

    #[test]
    fn test_dry_run_missing_upstream_reports_error() {
        let svc = service_with(Arc::new(LiteralEngine), vec![Route::new("r", "/", "ghost")]);
        let res = svc.test_route(&TestRouteRequest::new("GET", "/"));
        assert!(res.matched);
        assert!(res.error.unwrap().contains("ghost"));
    }

    #[test]
    fn test_dry_run_with_rhai_expressions() {
        let mut route = Route::new("chat", "/v1/", "backend");
        route.path_rewrite = Some(r#""/chat/" + params["*"]"#.into());
        let mut t = Transform::default();
        t.set_headers
            .insert("X-Caller".into(), r#"headers["x-user"] + "@" + method"#.into());
        route.request_transform = Some(t);
        route.metering_expr = "body_size".into();
        let svc = service_with(Arc::new(RhaiEngine::default()), vec![route]);

        let res = svc.test_route(
            &TestRouteRequest::new("POST", "/v1/completions")
                .with_header("X-User", "ana")
                .with_body("hello"),
        );
        assert_eq!(res.path.as_deref(), Some("/chat/completions"));
        assert_eq!(
            res.upstream_url.as_deref(),
            Some("https://api.internal/chat/completions")
        );
        assert_eq!(res.headers.get("x-caller").map(String::as_str), Some("ana@POST"));
        assert_eq!(res.metering_value, Some(5.0));
    }

    #[test]
    fn test_validate_expr() {
        let svc = service_with(Arc::new(RhaiEngine::default()), vec![]);

        assert_eq!(
            svc.validate_expr("body_size * 2", ExprKind::Metering),
            ValidationResult { valid: true, error: None }
        );

        let res = svc.validate_expr("response_size", ExprKind::Request);
        assert!(!res.valid);
        assert!(res.error.is_some());

        assert!(svc.validate_expr("response_size", ExprKind::Response).valid);
        assert!(!svc.validate_expr("(", ExprKind::Request).valid);
        assert!(!svc.validate_expr("", ExprKind::Request).valid);
    }
}
