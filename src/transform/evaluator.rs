//! Transform evaluation.

use std::sync::Arc;

use axum::http::header::{HeaderName, HeaderValue};
use axum::http::HeaderMap;
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

use crate::expr::{
    value_to_body, value_to_text, EnvExpander, EvalContext, ExprEngine, ExprError, RequestContext,
    ResponseContext,
};
use crate::model::Transform;
use crate::observability::metrics;

/// A transform field that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// e.g. `set_headers.X-Tenant`.
    pub field: String,
    /// The expression as configured.
    pub expression: String,
    pub error: String,
}

/// The mutated request or response parts.
#[derive(Debug, Clone, Default)]
pub struct TransformOutput {
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub body: Bytes,
    /// True when `body_expr` produced the body.
    pub body_replaced: bool,
    pub errors: Vec<FieldError>,
}

impl TransformOutput {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Applies [`Transform`] rules using an expression engine.
#[derive(Debug, Clone)]
pub struct TransformEvaluator {
    engine: Arc<dyn ExprEngine>,
    env: EnvExpander,
}

impl TransformEvaluator {
    pub fn new(engine: Arc<dyn ExprEngine>, env: EnvExpander) -> Self {
        Self { engine, env }
    }

    pub fn engine(&self) -> &Arc<dyn ExprEngine> {
        &self.engine
    }

    /// Apply a request transform. `None` passes the request through.
    pub fn apply_request(&self, transform: Option<&Transform>, req: &RequestContext) -> TransformOutput {
        let mut out = TransformOutput {
            headers: req.headers.clone(),
            query: req.query.clone(),
            body: req.body.clone(),
            ..Default::default()
        };
        if let Some(t) = transform {
            let ctx = EvalContext::request(req);
            self.apply(t, &ctx, &mut out, true);
        }
        out
    }

    /// Apply a response transform. Query rules do not apply to responses.
    pub fn apply_response(
        &self,
        transform: Option<&Transform>,
        req: &RequestContext,
        resp: &ResponseContext,
    ) -> TransformOutput {
        let mut out = TransformOutput {
            headers: resp.headers.clone(),
            body: resp.body.clone(),
            ..Default::default()
        };
        if let Some(t) = transform {
            let ctx = EvalContext::response(req, resp);
            self.apply(t, &ctx, &mut out, false);
        }
        out
    }

    /// Evaluate a path rewrite expression.
    pub fn rewrite_path(&self, expr: &str, req: &RequestContext) -> Result<String, ExprError> {
        let ctx = EvalContext::request(req);
        let value = self.eval(expr, &ctx)?;
        let path = value_to_text(&value)?;
        if path.is_empty() {
            return Err(ExprError::Type("path rewrite produced an empty path".into()));
        }
        Ok(path)
    }

    fn eval(&self, expr: &str, ctx: &EvalContext) -> Result<Value, ExprError> {
        let expanded = self.env.expand(expr);
        self.engine.evaluate(&expanded, ctx)
    }

    fn apply(&self, t: &Transform, ctx: &EvalContext, out: &mut TransformOutput, with_query: bool) {
        for (name, expr) in &t.set_headers {
            let field = format!("set_headers.{}", name);
            let result = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| e.to_string())
                .and_then(|header| {
                    let value = self.eval(expr, ctx).map_err(|e| e.to_string())?;
                    let text = value_to_text(&value).map_err(|e| e.to_string())?;
                    let value = HeaderValue::from_str(&text).map_err(|e| e.to_string())?;
                    Ok((header, value))
                });
            match result {
                Ok((header, value)) => {
                    out.headers.insert(header, value);
                }
                Err(error) => record(out, field, expr, error),
            }
        }

        if with_query {
            for (name, expr) in &t.set_query {
                let field = format!("set_query.{}", name);
                match self
                    .eval(expr, ctx)
                    .and_then(|v| value_to_text(&v))
                {
                    Ok(text) => {
                        out.query.retain(|(k, _)| k != name);
                        out.query.push((name.clone(), text));
                    }
                    Err(e) => record(out, field, expr, e.to_string()),
                }
            }
        }

        for name in &t.delete_headers {
            match HeaderName::from_bytes(name.as_bytes()) {
                Ok(header) => {
                    out.headers.remove(header);
                }
                Err(e) => record(out, format!("delete_headers.{}", name), name, e.to_string()),
            }
        }

        if with_query {
            for name in &t.delete_query {
                out.query.retain(|(k, _)| k != name);
            }
        }

        if let Some(expr) = &t.body_expr {
            match self.eval(expr, ctx).and_then(|v| value_to_body(&v)) {
                Ok(body) => {
                    out.body = Bytes::from(body);
                    out.body_replaced = true;
                }
                Err(e) => record(out, "body_expr".to_string(), expr, e.to_string()),
            }
        }
    }
}

fn record(out: &mut TransformOutput, field: String, expression: &str, error: String) {
    tracing::warn!(field = %field, error = %error, "Transform field skipped");
    metrics::record_expr_failure("transform");
    out.errors.push(FieldError {
        field,
        expression: expression.to_string(),
        error,
    });
}
