//! Route definitions.

use serde::{Deserialize, Serialize};

use crate::model::transform::Transform;

/// Metering expression used when a route does not set one.
pub const DEFAULT_METERING_EXPR: &str = "1";

/// How a route's path pattern is compared against the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Path equals the pattern.
    Exact,
    /// Path starts with the pattern.
    #[default]
    Prefix,
    /// Path fully matches the compiled regex.
    Regex,
}

impl MatchType {
    /// Specificity rank used for tie-breaking (higher is more specific).
    pub fn specificity(self) -> u8 {
        match self {
            MatchType::Exact => 2,
            MatchType::Regex => 1,
            MatchType::Prefix => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::Prefix => "prefix",
            MatchType::Regex => "regex",
        }
    }
}

/// Protocol served by the route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    #[default]
    Http,
    /// Only matches requests asking for a websocket upgrade.
    Websocket,
    /// Server-sent events; matched like plain HTTP.
    Sse,
}

/// Which context the metering expression is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MeteringMode {
    /// Request data only.
    #[default]
    Request,
    /// Request plus upstream response data.
    Response,
}

/// A routing rule mapping inbound requests to an upstream.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Route {
    /// Unique route identifier.
    pub id: String,

    /// Human readable name.
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example_request: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example_response: Option<String>,

    /// Pattern compared against the request path.
    pub path_pattern: String,

    #[serde(default)]
    pub match_type: MatchType,

    /// Allowed HTTP methods (empty = any).
    #[serde(default)]
    pub methods: Vec<String>,

    /// Explicit tie-break (higher wins).
    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub protocol: Protocol,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Upstream this route forwards to.
    pub upstream_id: String,

    /// Replacement HTTP method for the outbound request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_override: Option<String>,

    /// Expression producing the outbound path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_rewrite: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_transform: Option<Transform>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_transform: Option<Transform>,

    #[serde(default = "default_metering_expr")]
    pub metering_expr: String,

    #[serde(default)]
    pub metering_mode: MeteringMode,

    #[serde(default = "default_metering_unit")]
    pub metering_unit: String,
}

fn default_enabled() -> bool {
    true
}

fn default_metering_expr() -> String {
    DEFAULT_METERING_EXPR.to_string()
}

fn default_metering_unit() -> String {
    "requests".to_string()
}

impl Route {
    /// Create an enabled prefix route with defaults for everything else.
    pub fn new(
        id: impl Into<String>,
        path_pattern: impl Into<String>,
        upstream_id: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: None,
            example_request: None,
            example_response: None,
            path_pattern: path_pattern.into(),
            match_type: MatchType::default(),
            methods: Vec::new(),
            priority: 0,
            protocol: Protocol::default(),
            enabled: true,
            upstream_id: upstream_id.into(),
            method_override: None,
            path_rewrite: None,
            request_transform: None,
            response_transform: None,
            metering_expr: default_metering_expr(),
            metering_mode: MeteringMode::default(),
            metering_unit: default_metering_unit(),
        }
    }

    pub fn with_match_type(mut self, match_type: MatchType) -> Self {
        self.match_type = match_type;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_methods(mut self, methods: &[&str]) -> Self {
        self.methods = methods.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Copy with empty transforms removed, methods upper-cased and an empty
    /// metering expression replaced by the default.
    pub fn normalized(&self) -> Route {
        let mut route = self.clone();
        route.request_transform = Transform::normalize(route.request_transform);
        route.response_transform = Transform::normalize(route.response_transform);
        route.methods = route
            .methods
            .iter()
            .map(|m| m.trim().to_ascii_uppercase())
            .filter(|m| !m.is_empty())
            .collect();
        route.method_override = route
            .method_override
            .map(|m| m.trim().to_ascii_uppercase())
            .filter(|m| !m.is_empty());
        route.path_rewrite = route.path_rewrite.filter(|p| !p.trim().is_empty());
        if route.metering_expr.trim().is_empty() {
            route.metering_expr = default_metering_expr();
        }
        route
    }

    /// Whether the route accepts this method (case-insensitive).
    pub fn allows_method(&self, method: &str) -> bool {
        self.methods.is_empty() || self.methods.iter().any(|m| m.eq_ignore_ascii_case(method))
    }
}
