//! Outbound URL resolution and credential injection.

use axum::http::header::{HeaderName, HeaderValue, AUTHORIZATION};
use axum::http::HeaderMap;
use thiserror::Error;
use url::Url;

use crate::expr::EnvExpander;
use crate::model::{Upstream, UpstreamAuth};

/// Errors raised while building the outbound request target.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("upstream {upstream_id}: invalid base url '{base_url}': {source}")]
    BaseUrl {
        upstream_id: String,
        base_url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("upstream {upstream_id}: cannot resolve path '{path}': {source}")]
    Path {
        upstream_id: String,
        path: String,
        #[source]
        source: url::ParseError,
    },

    #[error("upstream {upstream_id}: base url '{base_url}' cannot carry a path")]
    NotHierarchical { upstream_id: String, base_url: String },

    #[error("upstream {upstream_id}: invalid auth header name '{name}'")]
    AuthHeaderName { upstream_id: String, name: String },

    #[error("upstream {upstream_id}: auth value is not a valid header value")]
    AuthHeaderValue { upstream_id: String },
}

/// Builds outbound URLs and injects upstream credentials.
#[derive(Debug, Clone, Default)]
pub struct UpstreamResolver {
    env: EnvExpander,
}

impl UpstreamResolver {
    pub fn new(env: EnvExpander) -> Self {
        Self { env }
    }

    pub fn env(&self) -> &EnvExpander {
        &self.env
    }

    /// Resolve `path` against the upstream base URL (RFC 3986 reference
    /// resolution) and append `query`.
    pub fn resolve_url(
        &self,
        upstream: &Upstream,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Url, ResolveError> {
        let base = Url::parse(&upstream.base_url).map_err(|source| ResolveError::BaseUrl {
            upstream_id: upstream.id.clone(),
            base_url: upstream.base_url.clone(),
            source,
        })?;
        if base.cannot_be_a_base() {
            return Err(ResolveError::NotHierarchical {
                upstream_id: upstream.id.clone(),
                base_url: upstream.base_url.clone(),
            });
        }

        let mut url = base.join(path).map_err(|source| ResolveError::Path {
            upstream_id: upstream.id.clone(),
            path: path.to_string(),
            source,
        })?;
        url.set_fragment(None);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter());
        }
        Ok(url)
    }

    /// Return `headers` with the upstream's credentials injected.
    pub fn apply_auth(&self, upstream: &Upstream, mut headers: HeaderMap) -> Result<HeaderMap, ResolveError> {
        let (name, value) = match &upstream.auth {
            UpstreamAuth::None => return Ok(headers),
            UpstreamAuth::Header { name, value } => {
                let header = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                    ResolveError::AuthHeaderName {
                        upstream_id: upstream.id.clone(),
                        name: name.clone(),
                    }
                })?;
                (header, self.env.expand(value))
            }
            UpstreamAuth::Bearer { value } => (AUTHORIZATION, format!("Bearer {}", self.env.expand(value))),
            UpstreamAuth::Basic { value } => (AUTHORIZATION, format!("Basic {}", self.env.expand(value))),
        };

        let value = HeaderValue::from_str(&value).map_err(|_| ResolveError::AuthHeaderValue {
            upstream_id: upstream.id.clone(),
        })?;
        headers.insert(name, value);
        Ok(headers)
    }
}
