//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.
//! Routes and upstreams in the file are seed data for the route store.

use serde::{Deserialize, Serialize};

use crate::expr::{ExprLimits, MissingVarPolicy};
use crate::model::{Route, Upstream};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Proxy listener settings.
    pub listener: ListenerConfig,

    /// Snapshot refresh settings.
    pub cache: CacheConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Usage metering settings.
    pub metering: MeteringConfig,

    /// Expression sandbox and placeholder settings.
    pub expressions: ExpressionConfig,

    /// Route seed data.
    pub routes: Vec<Route>,

    /// Upstream seed data.
    pub upstreams: Vec<Upstream>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Largest request body buffered for transforms and forwarding.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Configuration cache refresh settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Interval between scheduled reloads.
    pub refresh_interval_secs: u64,

    /// A reload running longer than this is abandoned.
    pub reload_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 30,
            reload_timeout_secs: 10,
        }
    }
}

/// Timeout configuration for inbound requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total time allowed for an inbound request, upstream included.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 60 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a filter directive.
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token). `${NAME}` is expanded.
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Usage metering configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MeteringConfig {
    /// Emit a usage record for every proxied request.
    pub enabled: bool,
}

impl Default for MeteringConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Expression engine configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ExpressionConfig {
    /// Sandbox limits.
    pub limits: ExprLimits,

    /// What an unset `${NAME}` expands to.
    pub missing_env: MissingVarPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MatchType, UpstreamAuth};

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: GatewayConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.cache.refresh_interval_secs, 30);
        assert_eq!(config.cache.reload_timeout_secs, 10);
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
        assert!(config.metering.enabled);
        assert_eq!(config.expressions.missing_env, MissingVarPolicy::Empty);
        assert!(config.routes.is_empty());
    }

    #[test]
    fn test_full_config() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [observability]
            log_format = "json"

            [expressions]
            missing_env = "keep"

            [expressions.limits]
            max_operations = 500
            max_cached_expressions = 128

            [[upstreams]]
            id = "billing"
            base_url = "https://billing.internal/"
            auth = { type = "bearer", value = "${BILLING_TOKEN}" }

            [[routes]]
            id = "invoices"
            path_pattern = "/invoices"
            match_type = "exact"
            upstream_id = "billing"
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.listener.max_body_bytes, 10 * 1024 * 1024);
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.expressions.missing_env, MissingVarPolicy::Keep);
        assert_eq!(config.expressions.limits.max_operations, 500);
        assert_eq!(config.expressions.limits.max_call_levels, 16);
        assert_eq!(config.expressions.limits.max_cached_expressions, 128);
        assert_eq!(config.routes[0].match_type, MatchType::Exact);
        assert!(matches!(config.upstreams[0].auth, UpstreamAuth::Bearer { .. }));
    }
}
