//! Expression evaluation capability.
//!
//! # Data Flow
//! ```text
//! route config (set_headers, body_expr, path_rewrite, metering_expr)
//!     → env.rs (expand ${NAME} placeholders)
//!     → ExprEngine::evaluate(expr, EvalContext)
//!     → serde_json::Value
//!     → caller converts to header text / body bytes / number
//! ```
//!
//! # Design Decisions
//! - The routing core only depends on the narrow [`ExprEngine`] trait
//! - Default engine is sandboxed Rhai, expressions only (no statements)
//! - Validation checks syntax and variable names without executing

pub mod context;
pub mod env;
pub mod script;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use self::context::{EvalContext, RequestContext, ResponseContext};
pub use self::env::{EnvExpander, EnvSource, MapEnv, MissingVarPolicy, ProcessEnv};
pub use self::script::{ExprLimits, RhaiEngine};

/// Variables visible to request-side expressions.
pub const REQUEST_VARS: &[&str] = &[
    "method", "path", "params", "headers", "query", "body", "body_size",
];

/// Variables added for response-side expressions.
pub const RESPONSE_VARS: &[&str] = &["status", "response_headers", "response_body", "response_size"];

/// Errors raised while checking or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("evaluation failed: {0}")]
    Eval(String),

    #[error("unexpected result: {0}")]
    Type(String),
}

/// Which context an expression will be evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprKind {
    /// Request transform values.
    Request,
    /// Response transform values.
    Response,
    /// Outbound path rewrite.
    PathRewrite,
    /// Metering against request data.
    Metering,
}

impl ExprKind {
    /// Variable names in scope for this kind.
    pub fn variables(self) -> Vec<&'static str> {
        let mut vars = REQUEST_VARS.to_vec();
        if self == ExprKind::Response {
            vars.extend_from_slice(RESPONSE_VARS);
        }
        vars
    }
}

impl fmt::Display for ExprKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExprKind::Request => "request",
            ExprKind::Response => "response",
            ExprKind::PathRewrite => "path_rewrite",
            ExprKind::Metering => "metering",
        };
        f.write_str(s)
    }
}

/// A pluggable expression language.
pub trait ExprEngine: Send + Sync + fmt::Debug {
    /// Evaluate `expr` with the variables of `ctx` in scope.
    fn evaluate(&self, expr: &str, ctx: &EvalContext) -> Result<Value, ExprError>;

    /// Check `expr` without executing it.
    fn validate(&self, expr: &str, kind: ExprKind) -> Result<(), ExprError>;
}

/// Text form of a value for headers, query parameters and paths.
pub fn value_to_text(value: &Value) -> Result<String, ExprError> {
    match value {
        Value::Null => Err(ExprError::Type("expression produced no value".into())),
        Value::String(s) => Ok(s.clone()),
        other => Ok(other.to_string()),
    }
}

/// Body bytes for a value; strings are used verbatim, structures as JSON.
pub fn value_to_body(value: &Value) -> Result<Vec<u8>, ExprError> {
    match value {
        Value::Null => Err(ExprError::Type("expression produced no value".into())),
        Value::String(s) => Ok(s.clone().into_bytes()),
        other => serde_json::to_vec(other).map_err(|e| ExprError::Type(e.to_string())),
    }
}

/// Numeric form of a value; numeric strings are accepted.
pub fn value_to_number(value: &Value) -> Result<f64, ExprError> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.ok_or_else(|| ExprError::Type(format!("expected a number, got {}", value)))
}

#[cfg(test)]
pub(crate) mod testing {
    //! A trivial engine for tests that only understands literals and
    //! variable lookups.

    use super::*;

    #[derive(Debug, Default)]
    pub struct LiteralEngine;

    impl LiteralEngine {
        fn parse(expr: &str) -> Result<Term<'_>, ExprError> {
            let e = expr.trim();
            if e.len() >= 2
                && ((e.starts_with('\'') && e.ends_with('\''))
                    || (e.starts_with('"') && e.ends_with('"')))
            {
                return Ok(Term::Text(&e[1..e.len() - 1]));
            }
            if let Ok(n) = e.parse::<f64>() {
                return Ok(Term::Number(n));
            }
            let mut parts = e.splitn(2, '.');
            let head = parts.next().unwrap_or_default();
            if !head.is_empty() && head.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Ok(Term::Var(head, parts.next()));
            }
            Err(ExprError::Syntax(format!("malformed expression: {}", expr)))
        }
    }

    enum Term<'a> {
        Text(&'a str),
        Number(f64),
        Var(&'a str, Option<&'a str>),
    }

    impl ExprEngine for LiteralEngine {
        fn evaluate(&self, expr: &str, ctx: &EvalContext) -> Result<Value, ExprError> {
            match Self::parse(expr)? {
                Term::Text(t) => Ok(Value::String(t.to_string())),
                Term::Number(n) => Ok(serde_json::json!(n)),
                Term::Var(name, field) => {
                    let v = ctx
                        .get(name)
                        .ok_or_else(|| ExprError::Eval(format!("unknown variable {}", name)))?;
                    match field {
                        Some(f) => Ok(v.get(f).cloned().unwrap_or(Value::Null)),
                        None => Ok(v.clone()),
                    }
                }
            }
        }

        fn validate(&self, expr: &str, kind: ExprKind) -> Result<(), ExprError> {
            match Self::parse(expr)? {
                Term::Var(name, _) if !kind.variables().contains(&name) => {
                    Err(ExprError::Syntax(format!("unknown variable {}", name)))
                }
                _ => Ok(()),
            }
        }
    }
}
