//! Route lookup.
//!
//! # Responsibilities
//! - Compile enabled routes into an immutable index
//! - Look up the best route for a request
//! - Return the matched route or an explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Routes are ranked once at build time; lookup returns the best-ranked hit
//! - O(1) lookup for parameter-free exact routes, ordered scan for the rest
//! - Ranking: priority (higher first), match type (exact > regex > prefix),
//!   literal pattern length (longer first), then load order

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;

use axum::http::HeaderMap;
use thiserror::Error;

use crate::model::{Protocol, Route};
use crate::routing::matcher::{self, is_websocket_upgrade, PathMatcher, PathParams};

/// Errors raised while compiling a route set.
#[derive(Debug, Error)]
pub enum RouteBuildError {
    #[error("route {route_id}: empty path pattern")]
    EmptyPattern { route_id: String },

    #[error("route {route_id}: invalid regex '{pattern}': {source}")]
    InvalidRegex {
        route_id: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// The selected route plus extracted path parameters.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub route: Arc<Route>,
    pub params: PathParams,
}

#[derive(Debug)]
struct CompiledRoute {
    route: Arc<Route>,
    matcher: Box<dyn PathMatcher>,
}

impl CompiledRoute {
    fn accepts(&self, method: &str, headers: &HeaderMap) -> bool {
        if !self.route.allows_method(method) {
            return false;
        }
        match self.route.protocol {
            Protocol::Websocket => is_websocket_upgrade(headers),
            Protocol::Http | Protocol::Sse => true,
        }
    }
}

/// Compiled, ranked route index.
#[derive(Debug, Default)]
pub struct RouteMatcher {
    /// Best-ranked first.
    ranked: Vec<CompiledRoute>,
    /// Literal exact path → positions in `ranked`.
    exact: HashMap<String, Vec<usize>>,
    /// Positions in `ranked` that need a pattern test, in rank order.
    scan: Vec<usize>,
}

impl RouteMatcher {
    /// Compile `routes`; disabled routes are dropped before indexing.
    pub fn build(routes: &[Arc<Route>]) -> Result<Self, RouteBuildError> {
        let mut compiled = Vec::with_capacity(routes.len());

        for (load_order, route) in routes.iter().filter(|r| r.enabled).enumerate() {
            if route.path_pattern.is_empty() {
                return Err(RouteBuildError::EmptyPattern {
                    route_id: route.id.clone(),
                });
            }
            let matcher = matcher::compile(&route.path_pattern, route.match_type).map_err(
                |source| RouteBuildError::InvalidRegex {
                    route_id: route.id.clone(),
                    pattern: route.path_pattern.clone(),
                    source,
                },
            )?;
            let key = (
                Reverse(route.priority),
                Reverse(route.match_type.specificity()),
                Reverse(matcher.literal_len()),
                load_order,
            );
            compiled.push((key, CompiledRoute {
                route: route.clone(),
                matcher,
            }));
        }

        compiled.sort_by(|a, b| a.0.cmp(&b.0));

        let mut index = Self::default();
        for (pos, (_, entry)) in compiled.into_iter().enumerate() {
            match entry.matcher.exact_literal() {
                Some(path) => index.exact.entry(path.to_string()).or_default().push(pos),
                None => index.scan.push(pos),
            }
            index.ranked.push(entry);
        }

        tracing::debug!(
            routes = index.ranked.len(),
            exact = index.exact.len(),
            scanned = index.scan.len(),
            "Route matcher built"
        );
        Ok(index)
    }

    /// Find the best route for the request, or `None` when nothing matches.
    pub fn match_request(&self, method: &str, path: &str, headers: &HeaderMap) -> Option<MatchResult> {
        let mut best: Option<(usize, PathParams)> = self
            .exact
            .get(path)
            .and_then(|positions| {
                positions
                    .iter()
                    .copied()
                    .find(|&pos| self.ranked[pos].accepts(method, headers))
            })
            .map(|pos| (pos, PathParams::new()));

        for &pos in &self.scan {
            if matches!(best, Some((b, _)) if b < pos) {
                break;
            }
            let entry = &self.ranked[pos];
            if !entry.accepts(method, headers) {
                continue;
            }
            if let Some(params) = entry.matcher.match_path(path) {
                best = Some((pos, params));
                break;
            }
        }

        best.map(|(pos, params)| MatchResult {
            route: self.ranked[pos].route.clone(),
            params,
        })
    }

    /// Number of indexed (enabled) routes.
    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    /// Route ids in rank order.
    pub fn ranked_ids(&self) -> Vec<&str> {
        self.ranked.iter().map(|e| e.route.id.as_str()).collect()
    }
}
