//! Immutable configuration snapshots.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::HeaderMap;
use thiserror::Error;

use crate::model::{Route, Upstream};
use crate::routing::{MatchResult, RouteBuildError, RouteMatcher};
use crate::upstream::UpstreamClients;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("route matcher build failed: {0}")]
    Matcher(#[from] RouteBuildError),

    #[error("upstream client build failed: {0}")]
    Client(#[from] reqwest::Error),
}

/// Everything a request needs, built together and published together.
#[derive(Debug)]
pub struct Snapshot {
    /// Zero for the empty placeholder, then 1, 2, ... per publish.
    pub generation: u64,
    pub matcher: RouteMatcher,
    /// Enabled routes in load order.
    pub routes: Vec<Arc<Route>>,
    pub upstreams: HashMap<String, Arc<Upstream>>,
    pub clients: UpstreamClients,
    pub built_at: SystemTime,
}

impl Snapshot {
    /// Placeholder published before the first load.
    pub fn empty() -> Self {
        Self {
            generation: 0,
            matcher: RouteMatcher::default(),
            routes: Vec::new(),
            upstreams: HashMap::new(),
            clients: UpstreamClients::default(),
            built_at: UNIX_EPOCH,
        }
    }

    /// Build a snapshot. Disabled records are dropped and routes normalized.
    pub fn build(
        generation: u64,
        routes: Vec<Route>,
        upstreams: Vec<Upstream>,
        built_at: SystemTime,
    ) -> Result<Self, SnapshotError> {
        let routes: Vec<Arc<Route>> = routes
            .into_iter()
            .filter(|r| r.enabled)
            .map(|r| Arc::new(r.normalized()))
            .collect();
        let matcher = RouteMatcher::build(&routes)?;

        let upstream_list: Vec<Arc<Upstream>> = upstreams
            .into_iter()
            .filter(|u| u.enabled)
            .map(Arc::new)
            .collect();
        let clients = UpstreamClients::build(&upstream_list)?;
        let upstreams = upstream_list
            .into_iter()
            .map(|u| (u.id.clone(), u))
            .collect();

        Ok(Self {
            generation,
            matcher,
            routes,
            upstreams,
            clients,
            built_at,
        })
    }

    pub fn match_request(&self, method: &str, path: &str, headers: &HeaderMap) -> Option<MatchResult> {
        self.matcher.match_request(method, path, headers)
    }

    pub fn upstream(&self, id: &str) -> Option<&Arc<Upstream>> {
        self.upstreams.get(id)
    }

    pub fn route(&self, id: &str) -> Option<&Arc<Route>> {
        self.routes.iter().find(|r| r.id == id)
    }
}

/// Anything that can hand out the current snapshot.
pub trait SnapshotSource: Send + Sync + std::fmt::Debug {
    /// Lock-free load of the latest published snapshot.
    fn snapshot(&self) -> Arc<Snapshot>;
}

/// A fixed snapshot, for tests and tooling that never reloads.
#[derive(Debug, Clone)]
pub struct StaticSnapshot(Arc<Snapshot>);

impl StaticSnapshot {
    pub fn new(snapshot: Snapshot) -> Self {
        Self(Arc::new(snapshot))
    }

    pub fn from_records(routes: Vec<Route>, upstreams: Vec<Upstream>) -> Result<Self, SnapshotError> {
        Ok(Self::new(Snapshot::build(1, routes, upstreams, SystemTime::now())?))
    }
}

impl SnapshotSource for StaticSnapshot {
    fn snapshot(&self) -> Arc<Snapshot> {
        self.0.clone()
    }
}
