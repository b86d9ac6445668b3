//! The route service.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::header::{HeaderName, AUTHORIZATION};
use axum::http::HeaderMap;
use bytes::Bytes;
use thiserror::Error;
use url::Url;

use crate::cache::clock::unix_millis;
use crate::cache::{
    CacheError, CacheState, CacheStatus, ConfigCache, ReloadOutcome, ReloadTrigger, Snapshot,
    SnapshotSource,
};
use crate::expr::{EnvExpander, EvalContext, ExprEngine, RequestContext, ResponseContext};
use crate::metering::{MeteringEvaluator, MeteringOutcome};
use crate::model::{MeteringMode, Route, Transform, Upstream, UpstreamAuth};
use crate::observability::metrics;
use crate::routing::MatchResult;
use crate::transform::{FieldError, TransformEvaluator, TransformOutput};
use crate::upstream::{ResolveError, UpstreamResolver};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("reload is not available for a fixed snapshot")]
    ReloadUnavailable,

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Why a matched request cannot be forwarded.
#[derive(Debug, Error)]
pub enum PrepareError {
    #[error("upstream '{upstream_id}' is not available")]
    UpstreamUnavailable { upstream_id: String },

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// An outbound request ready to forward.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub route: Arc<Route>,
    pub upstream: Arc<Upstream>,
    pub method: String,
    /// Outbound path before resolution against the base URL.
    pub path: String,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Header the upstream credentials were written to.
    pub auth_header: Option<HeaderName>,
    /// Rewrite and transform fields that could not be applied.
    pub errors: Vec<FieldError>,
}

/// Façade over the configuration cache and the per-request evaluators.
#[derive(Debug, Clone)]
pub struct RouteService {
    source: Arc<dyn SnapshotSource>,
    cache: Option<Arc<ConfigCache>>,
    engine: Arc<dyn ExprEngine>,
    transforms: TransformEvaluator,
    resolver: UpstreamResolver,
    metering: MeteringEvaluator,
}

impl RouteService {
    /// Service backed by a live, reloadable cache.
    pub fn from_cache(cache: Arc<ConfigCache>, engine: Arc<dyn ExprEngine>, env: EnvExpander) -> Self {
        let mut service = Self::new(cache.clone(), engine, env);
        service.cache = Some(cache);
        service
    }

    /// Service over any snapshot source. `reload` is unavailable.
    pub fn new(source: Arc<dyn SnapshotSource>, engine: Arc<dyn ExprEngine>, env: EnvExpander) -> Self {
        Self {
            source,
            cache: None,
            transforms: TransformEvaluator::new(engine.clone(), env.clone()),
            resolver: UpstreamResolver::new(env),
            metering: MeteringEvaluator::new(engine.clone()),
            engine,
        }
    }

    pub fn engine(&self) -> &Arc<dyn ExprEngine> {
        &self.engine
    }

    /// The current snapshot. Hold it for the whole request.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.source.snapshot()
    }

    pub fn match_request(&self, method: &str, path: &str, headers: &HeaderMap) -> Option<MatchResult> {
        self.snapshot().match_request(method, path, headers)
    }

    pub fn get_upstream(&self, id: &str) -> Option<Arc<Upstream>> {
        self.snapshot().upstream(id).cloned()
    }

    pub fn get_routes(&self) -> Vec<Arc<Route>> {
        self.snapshot().routes.clone()
    }

    pub fn get_upstreams(&self) -> HashMap<String, Arc<Upstream>> {
        self.snapshot().upstreams.clone()
    }

    pub fn apply_auth(&self, upstream: &Upstream, headers: HeaderMap) -> Result<HeaderMap, ResolveError> {
        self.resolver.apply_auth(upstream, headers)
    }

    pub fn resolve_url(
        &self,
        upstream: &Upstream,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Url, ResolveError> {
        self.resolver.resolve_url(upstream, path, query)
    }

    pub fn evaluate_metering(&self, expr: Option<&str>, ctx: &EvalContext) -> MeteringOutcome {
        self.metering.evaluate(expr, ctx)
    }

    pub fn apply_request_transform(
        &self,
        transform: Option<&Transform>,
        req: &RequestContext,
    ) -> TransformOutput {
        self.transforms.apply_request(transform, req)
    }

    pub fn apply_response_transform(
        &self,
        transform: Option<&Transform>,
        req: &RequestContext,
        resp: &ResponseContext,
    ) -> TransformOutput {
        self.transforms.apply_response(transform, req, resp)
    }

    pub fn rewrite_path(&self, expr: &str, req: &RequestContext) -> Result<String, crate::expr::ExprError> {
        self.transforms.rewrite_path(expr, req)
    }

    /// Build the outbound request for a matched route.
    ///
    /// `req` is the inbound request with the match parameters filled in.
    pub fn prepare(
        &self,
        snapshot: &Snapshot,
        route: Arc<Route>,
        req: &RequestContext,
    ) -> Result<PreparedRequest, PrepareError> {
        let upstream = snapshot
            .upstream(&route.upstream_id)
            .cloned()
            .ok_or_else(|| PrepareError::UpstreamUnavailable {
                upstream_id: route.upstream_id.clone(),
            })?;

        let mut errors = Vec::new();

        let path = match &route.path_rewrite {
            Some(expr) => match self.transforms.rewrite_path(expr, req) {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!(route_id = %route.id, error = %e, "Path rewrite failed, forwarding original path");
                    metrics::record_expr_failure("path_rewrite");
                    errors.push(FieldError {
                        field: "path_rewrite".to_string(),
                        expression: expr.clone(),
                        error: e.to_string(),
                    });
                    req.path.clone()
                }
            },
            None => req.path.clone(),
        };

        let method = route
            .method_override
            .clone()
            .unwrap_or_else(|| req.method.clone());

        let out = self
            .transforms
            .apply_request(route.request_transform.as_ref(), req);
        errors.extend(out.errors);

        let url = self.resolver.resolve_url(&upstream, &path, &out.query)?;
        let headers = self.resolver.apply_auth(&upstream, out.headers)?;
        let auth_header = match &upstream.auth {
            UpstreamAuth::None => None,
            UpstreamAuth::Header { name, .. } => HeaderName::from_bytes(name.as_bytes()).ok(),
            UpstreamAuth::Bearer { .. } | UpstreamAuth::Basic { .. } => Some(AUTHORIZATION),
        };

        Ok(PreparedRequest {
            route,
            upstream,
            method,
            path,
            url,
            headers,
            body: out.body,
            auth_header,
            errors,
        })
    }

    /// Metering for a finished (or dry-run) request.
    ///
    /// Response-mode routes see the response when one is given.
    pub fn meter(&self, route: &Route, req: &RequestContext, resp: Option<&ResponseContext>) -> MeteringOutcome {
        let ctx = match (route.metering_mode, resp) {
            (MeteringMode::Response, Some(resp)) => EvalContext::response(req, resp),
            _ => EvalContext::request(req),
        };
        self.metering.evaluate(Some(&route.metering_expr), &ctx)
    }

    /// Force an out-of-cycle reload.
    pub async fn reload(&self) -> Result<ReloadOutcome, ServiceError> {
        let cache = self.cache.as_ref().ok_or(ServiceError::ReloadUnavailable)?;
        Ok(cache.reload(ReloadTrigger::Manual).await?)
    }

    pub fn status(&self) -> CacheStatus {
        if let Some(cache) = &self.cache {
            return cache.status();
        }
        let snap = self.snapshot();
        CacheStatus {
            state: CacheState::Ready,
            generation: snap.generation,
            routes: snap.routes.len(),
            upstreams: snap.upstreams.len(),
            built_at: unix_millis(snap.built_at),
            last_error: None,
        }
    }
}
