//! Declarative request/response mutation rules.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A set of header/query/body mutations.
///
/// `set_*` values are expressions evaluated against the request context;
/// `delete_*` entries are literal names. Sets are applied before deletes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Transform {
    /// Header name → expression.
    pub set_headers: BTreeMap<String, String>,

    /// Header names to remove.
    pub delete_headers: Vec<String>,

    /// Query parameter name → expression.
    pub set_query: BTreeMap<String, String>,

    /// Query parameter names to remove.
    pub delete_query: Vec<String>,

    /// Expression producing a replacement body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_expr: Option<String>,
}

impl Transform {
    /// True when applying this transform would change nothing.
    pub fn is_empty(&self) -> bool {
        self.set_headers.is_empty()
            && self.delete_headers.is_empty()
            && self.set_query.is_empty()
            && self.delete_query.is_empty()
            && self
                .body_expr
                .as_deref()
                .map(|b| b.trim().is_empty())
                .unwrap_or(true)
    }

    /// Drop the transform entirely when it is empty.
    pub fn normalize(transform: Option<Transform>) -> Option<Transform> {
        transform.filter(|t| !t.is_empty())
    }

    /// Every expression carried by this transform, with a field label.
    pub fn expressions(&self) -> Vec<(String, &str)> {
        let mut out = Vec::new();
        for (name, expr) in &self.set_headers {
            out.push((format!("set_headers.{}", name), expr.as_str()));
        }
        for (name, expr) in &self.set_query {
            out.push((format!("set_query.{}", name), expr.as_str()));
        }
        if let Some(body) = &self.body_expr {
            out.push(("body_expr".to_string(), body.as_str()));
        }
        out
    }
}
