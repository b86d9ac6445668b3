//! Rhai-backed expression engine.
//!
//! # Design
//!
//! One [`Engine`] is configured at startup and shared by every request.
//! Expressions are compiled to an AST once and cached by their text; only
//! the evaluation [`Scope`] is created per call. The cache holds at most
//! `max_cached_expressions` entries and is cleared when it would grow past
//! that, so expression text that varies per call (for example after
//! environment expansion) cannot grow it without bound.
//!
//! Scripts are sandboxed: operation, call-depth and size limits apply,
//! `eval` is disabled, and only single expressions are accepted. Strict
//! variable mode makes a reference to a variable that the context kind does
//! not provide a compile error, so validation catches it before save.
//!
//! # Helper Functions
//!
//! - `parse_json(text)` - parse JSON text into a map/array (unit on error)

use dashmap::DashMap;
use rhai::{Dynamic, Engine, Scope, AST};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::expr::{EvalContext, ExprEngine, ExprError, ExprKind};

/// Sandbox limits for the expression engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExprLimits {
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_string_size: usize,
    pub max_cached_expressions: usize,
}

impl Default for ExprLimits {
    fn default() -> Self {
        Self {
            max_operations: 10_000,
            max_call_levels: 16,
            max_string_size: 1024 * 1024,
            max_cached_expressions: 4096,
        }
    }
}

/// Sandboxed Rhai expression engine.
pub struct RhaiEngine {
    engine: Engine,
    ast_cache: DashMap<String, AST>,
    cache_capacity: usize,
}

impl std::fmt::Debug for RhaiEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RhaiEngine")
            .field("cached_expressions", &self.ast_cache.len())
            .finish()
    }
}

impl Default for RhaiEngine {
    fn default() -> Self {
        Self::new(ExprLimits::default())
    }
}

impl RhaiEngine {
    pub fn new(limits: ExprLimits) -> Self {
        let mut engine = Engine::new();

        engine.set_max_operations(limits.max_operations);
        engine.set_max_call_levels(limits.max_call_levels);
        engine.set_max_expr_depths(64, 32);
        engine.set_max_string_size(limits.max_string_size);
        engine.set_max_array_size(10_000);
        engine.set_max_map_size(10_000);
        engine.set_strict_variables(true);
        engine.disable_symbol("eval");

        engine.register_fn("parse_json", |text: &str| -> Dynamic {
            serde_json::from_str::<Value>(text)
                .ok()
                .and_then(|v| rhai::serde::to_dynamic(v).ok())
                .unwrap_or(Dynamic::UNIT)
        });

        Self {
            engine,
            ast_cache: DashMap::new(),
            cache_capacity: limits.max_cached_expressions,
        }
    }

    /// Number of compiled expressions held in the cache.
    pub fn cached(&self) -> usize {
        self.ast_cache.len()
    }

    fn compile(&self, expr: &str, scope: &Scope) -> Result<AST, ExprError> {
        if let Some(ast) = self.ast_cache.get(expr) {
            return Ok(ast.clone());
        }
        let ast = self
            .engine
            .compile_expression_with_scope(scope, expr)
            .map_err(|e| ExprError::Syntax(e.to_string()))?;
        if self.cache_capacity == 0 {
            return Ok(ast);
        }
        if self.ast_cache.len() >= self.cache_capacity {
            tracing::debug!(
                capacity = self.cache_capacity,
                "Expression cache full, clearing"
            );
            self.ast_cache.clear();
        }
        self.ast_cache.insert(expr.to_string(), ast.clone());
        Ok(ast)
    }
}

impl ExprEngine for RhaiEngine {
    fn evaluate(&self, expr: &str, ctx: &EvalContext) -> Result<Value, ExprError> {
        if expr.trim().is_empty() {
            return Err(ExprError::Syntax("empty expression".into()));
        }

        let mut scope = Scope::new();
        for (name, value) in ctx.vars() {
            let dynamic =
                rhai::serde::to_dynamic(value).map_err(|e| ExprError::Eval(e.to_string()))?;
            scope.push_dynamic(name.as_str(), dynamic);
        }

        let ast = self.compile(expr, &scope)?;
        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &ast)
            .map_err(|e| ExprError::Eval(e.to_string()))?;

        Ok(rhai::serde::from_dynamic::<Value>(&result)
            .unwrap_or_else(|_| Value::String(result.to_string())))
    }

    fn validate(&self, expr: &str, kind: ExprKind) -> Result<(), ExprError> {
        if expr.trim().is_empty() {
            return Err(ExprError::Syntax("empty expression".into()));
        }

        let mut scope = Scope::new();
        for name in kind.variables() {
            scope.push_dynamic(name, Dynamic::UNIT);
        }
        self.engine
            .compile_expression_with_scope(&scope, expr)
            .map(|_| ())
            .map_err(|e| ExprError::Syntax(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{RequestContext, ResponseContext};
    use axum::http::{HeaderMap, HeaderValue};
    use bytes::Bytes;
    use serde_json::json;

    fn ctx() -> EvalContext {
        let mut headers = HeaderMap::new();
        headers.insert("x-units", HeaderValue::from_static("3"));
        let req = RequestContext::new("POST", "/v1/orders/42")
            .with_headers(headers)
            .with_query(Some("page=2"))
            .with_params([("id".to_string(), "42".to_string())].into())
            .with_body(r#"{"items":[1,2,3]}"#);
        EvalContext::request(&req)
    }

    #[test]
    fn test_evaluates_against_context() {
        let engine = RhaiEngine::default();
        let c = ctx();

        assert_eq!(engine.evaluate("\"ok\"", &c).unwrap(), json!("ok"));
        assert_eq!(engine.evaluate("method", &c).unwrap(), json!("POST"));
        assert_eq!(engine.evaluate("params.id", &c).unwrap(), json!("42"));
        assert_eq!(engine.evaluate("headers[\"x-units\"]", &c).unwrap(), json!("3"));
        assert_eq!(engine.evaluate("body_size * 2", &c).unwrap(), json!(34));
        assert_eq!(
            engine.evaluate("\"/api\" + path", &c).unwrap(),
            json!("/api/v1/orders/42")
        );
        assert_eq!(
            engine.evaluate("parse_json(body).items.len()", &c).unwrap(),
            json!(3)
        );
    }

    #[test]
    fn test_map_results_become_json() {
        let engine = RhaiEngine::default();
        let v = engine.evaluate("#{ wrapped: body_size }", &ctx()).unwrap();
        assert_eq!(v, json!({"wrapped": 17}));
    }

    #[test]
    fn test_errors() {
        let engine = RhaiEngine::default();
        let c = ctx();

        assert!(matches!(engine.evaluate("1 +", &c), Err(ExprError::Syntax(_))));
        assert!(matches!(engine.evaluate("", &c), Err(ExprError::Syntax(_))));
        assert!(matches!(
            engine.evaluate("missing_var", &c),
            Err(ExprError::Syntax(_))
        ));
        assert!(matches!(
            engine.evaluate("no_such_fn(1)", &c),
            Err(ExprError::Eval(_))
        ));
        // Statements are rejected: only single expressions are allowed.
        assert!(engine.evaluate("let x = 1; x", &c).is_err());
    }

    #[test]
    fn test_runaway_loops_are_bounded() {
        let engine = RhaiEngine::new(ExprLimits {
            max_operations: 100,
            ..Default::default()
        });
        let c = ctx();
        assert!(engine.evaluate("(0..1000000).map(|x| x * 2).len()", &c).is_err());
    }

    #[test]
    fn test_validate_by_kind() {
        let engine = RhaiEngine::default();

        assert!(engine.validate("headers[\"x-a\"] + \"!\"", ExprKind::Request).is_ok());
        assert!(engine.validate("response_size", ExprKind::Request).is_err());
        assert!(engine.validate("response_size", ExprKind::Response).is_ok());
        assert!(engine.validate("1 +", ExprKind::Metering).is_err());
        assert!(engine.validate("   ", ExprKind::Metering).is_err());
        assert_eq!(engine.cached(), 0);
    }

    #[test]
    fn test_ast_cache_reused() {
        let engine = RhaiEngine::default();
        let c = ctx();
        engine.evaluate("body_size + 1", &c).unwrap();
        engine.evaluate("body_size + 1", &c).unwrap();
        assert_eq!(engine.cached(), 1);

        let req = RequestContext::new("GET", "/");
        let resp = ResponseContext {
            status: 200,
            headers: HeaderMap::new(),
            body: Bytes::from_static(b"abcd"),
        };
        let rc = EvalContext::response(&req, &resp);
        assert_eq!(engine.evaluate("response_size", &rc).unwrap(), json!(4));
    }

    #[test]
    fn test_ast_cache_is_bounded() {
        let engine = RhaiEngine::new(ExprLimits {
            max_cached_expressions: 8,
            ..Default::default()
        });
        let c = ctx();
        // Distinct text per call, as with per-request environment values.
        for i in 0..100 {
            let expr = format!("\"token-{i}\" + path");
            assert_eq!(
                engine.evaluate(&expr, &c).unwrap(),
                json!(format!("token-{i}/v1/orders/42"))
            );
            assert!(engine.cached() <= 8);
        }

        let uncached = RhaiEngine::new(ExprLimits {
            max_cached_expressions: 0,
            ..Default::default()
        });
        uncached.evaluate("body_size + 1", &c).unwrap();
        assert_eq!(uncached.cached(), 0);
    }
}
