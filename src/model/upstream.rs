//! Upstream (backend target) definitions.

use serde::{Deserialize, Serialize};

/// Placeholder shown instead of credentials in outward-facing reads.
pub const REDACTED: &str = "<redacted>";

/// Credentials injected into requests forwarded to an upstream.
///
/// Values may contain `${NAME}` placeholders expanded from the
/// environment at request time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpstreamAuth {
    #[default]
    None,
    /// Sets `name: value`.
    Header { name: String, value: String },
    /// Sets `Authorization: Bearer <value>`.
    Bearer { value: String },
    /// Sets `Authorization: Basic <value>`; the value is expected pre-encoded.
    Basic { value: String },
}

impl UpstreamAuth {
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamAuth::None => "none",
            UpstreamAuth::Header { .. } => "header",
            UpstreamAuth::Bearer { .. } => "bearer",
            UpstreamAuth::Basic { .. } => "basic",
        }
    }

    fn redacted(&self) -> UpstreamAuth {
        match self {
            UpstreamAuth::None => UpstreamAuth::None,
            UpstreamAuth::Header { name, .. } => UpstreamAuth::Header {
                name: name.clone(),
                value: REDACTED.to_string(),
            },
            UpstreamAuth::Bearer { .. } => UpstreamAuth::Bearer {
                value: REDACTED.to_string(),
            },
            UpstreamAuth::Basic { .. } => UpstreamAuth::Basic {
                value: REDACTED.to_string(),
            },
        }
    }
}

/// A forwarding target.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Upstream {
    /// Unique upstream identifier.
    pub id: String,

    pub name: String,

    /// Absolute base URL (e.g. "http://10.0.0.4:8080/api/").
    pub base_url: String,

    /// Total request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum idle pooled connections.
    #[serde(default = "default_max_idle_conns")]
    pub max_idle_conns: usize,

    /// Idle pooled connection lifetime in seconds.
    #[serde(default = "default_idle_conn_timeout_secs")]
    pub idle_conn_timeout_secs: u64,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub auth: UpstreamAuth,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_idle_conns() -> usize {
    100
}

fn default_idle_conn_timeout_secs() -> u64 {
    90
}

fn default_enabled() -> bool {
    true
}

impl Upstream {
    /// Create an enabled upstream without auth.
    pub fn new(id: impl Into<String>, base_url: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            base_url: base_url.into(),
            timeout_secs: default_timeout_secs(),
            max_idle_conns: default_max_idle_conns(),
            idle_conn_timeout_secs: default_idle_conn_timeout_secs(),
            enabled: true,
            auth: UpstreamAuth::None,
        }
    }

    pub fn with_auth(mut self, auth: UpstreamAuth) -> Self {
        self.auth = auth;
        self
    }

    /// Copy safe to show outside the process.
    pub fn redacted(&self) -> Upstream {
        Upstream {
            auth: self.auth.redacted(),
            ..self.clone()
        }
    }
}
