//! Metering expression evaluation.

use std::sync::Arc;

use serde::Serialize;

use crate::expr::{value_to_number, EvalContext, ExprEngine, ExprError};
use crate::observability::metrics;

/// Value reported when no expression is set or evaluation fails.
pub const DEFAULT_METERING_VALUE: f64 = 1.0;

/// Result of a metering evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeteringOutcome {
    pub value: f64,
    /// True when `value` is the default because evaluation failed.
    pub fell_back: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MeteringOutcome {
    fn ok(value: f64) -> Self {
        Self {
            value,
            fell_back: false,
            error: None,
        }
    }

    fn fallback(error: ExprError) -> Self {
        Self {
            value: DEFAULT_METERING_VALUE,
            fell_back: true,
            error: Some(error.to_string()),
        }
    }
}

/// Computes usage values from metering expressions.
#[derive(Debug, Clone)]
pub struct MeteringEvaluator {
    engine: Arc<dyn ExprEngine>,
}

impl MeteringEvaluator {
    pub fn new(engine: Arc<dyn ExprEngine>) -> Self {
        Self { engine }
    }

    /// Evaluate `expr` against `ctx`. Never fails.
    pub fn evaluate(&self, expr: Option<&str>, ctx: &EvalContext) -> MeteringOutcome {
        let expr = match expr.map(str::trim) {
            None | Some("") => return MeteringOutcome::ok(DEFAULT_METERING_VALUE),
            Some(e) => e,
        };

        let result = match expr.parse::<f64>() {
            Ok(n) => Ok(n),
            Err(_) => self
                .engine
                .evaluate(expr, ctx)
                .and_then(|v| value_to_number(&v)),
        }
        .and_then(check);

        match result {
            Ok(value) => MeteringOutcome::ok(value),
            Err(e) => {
                tracing::warn!(expression = %expr, error = %e, "Metering expression failed, using default");
                metrics::record_expr_failure("metering");
                MeteringOutcome::fallback(e)
            }
        }
    }

    /// Convenience wrapper returning only the number.
    pub fn value(&self, expr: Option<&str>, ctx: &EvalContext) -> f64 {
        self.evaluate(expr, ctx).value
    }
}

fn check(value: f64) -> Result<f64, ExprError> {
    if !value.is_finite() {
        return Err(ExprError::Type(format!("metering value {} is not finite", value)));
    }
    if value < 0.0 {
        return Err(ExprError::Type(format!("metering value {} is negative", value)));
    }
    Ok(value)
}
