//! Route and upstream storage seams.
//!
//! # Responsibilities
//! - Define the read operations the cache depends on
//! - Provide an in-memory store seeded from the config file
//! - Reject records that break write-time invariants
//!
//! # Design Decisions
//! - Persistence technology is outside the gateway; only these traits are used
//! - Insertion order is preserved because it is the final match tie-break
//! - Invalid writes never reach the store, so refreshes only fail on I/O
//! - `ConfigStore` lists routes and upstreams from one state, never a mix

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use crate::config::validation::{join_errors, validate_route, validate_upstream, ValidationError};
use crate::model::{Route, Upstream};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid record: {}", join_errors(.0))]
    Invalid(Vec<ValidationError>),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait RouteStore: Send + Sync {
    /// Enabled routes in load order.
    async fn list_enabled_routes(&self) -> Result<Vec<Route>, StoreError>;
}

#[async_trait]
pub trait UpstreamStore: Send + Sync {
    async fn list_enabled_upstreams(&self) -> Result<Vec<Upstream>, StoreError>;
}

/// A store that reads routes and upstreams as one consistent view.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Enabled routes in load order and enabled upstreams, from the same state.
    async fn list_enabled(&self) -> Result<(Vec<Route>, Vec<Upstream>), StoreError>;
}

#[derive(Debug, Default)]
struct StoreData {
    routes: Vec<Route>,
    upstreams: Vec<Upstream>,
}

/// In-memory route and upstream store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<StoreData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from seed data, validating every record.
    pub fn seeded(routes: Vec<Route>, upstreams: Vec<Upstream>) -> Result<Self, StoreError> {
        let store = Self::new();
        store.replace_all(routes, upstreams)?;
        Ok(store)
    }

    /// Insert or update a route. An update keeps the original load position.
    pub fn put_route(&self, route: Route) -> Result<(), StoreError> {
        let route = checked_route(route)?;
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        match data.routes.iter_mut().find(|r| r.id == route.id) {
            Some(existing) => *existing = route,
            None => data.routes.push(route),
        }
        Ok(())
    }

    pub fn put_upstream(&self, upstream: Upstream) -> Result<(), StoreError> {
        let errors = validate_upstream(&upstream);
        if !errors.is_empty() {
            return Err(StoreError::Invalid(errors));
        }
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        match data.upstreams.iter_mut().find(|u| u.id == upstream.id) {
            Some(existing) => *existing = upstream,
            None => data.upstreams.push(upstream),
        }
        Ok(())
    }

    pub fn remove_route(&self, id: &str) -> Result<Route, StoreError> {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        let pos = data
            .routes
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "route",
                id: id.to_string(),
            })?;
        Ok(data.routes.remove(pos))
    }

    pub fn remove_upstream(&self, id: &str) -> Result<Upstream, StoreError> {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        let pos = data
            .upstreams
            .iter()
            .position(|u| u.id == id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "upstream",
                id: id.to_string(),
            })?;
        Ok(data.upstreams.remove(pos))
    }

    /// Replace the whole data set. Nothing changes unless every record is valid.
    pub fn replace_all(&self, routes: Vec<Route>, upstreams: Vec<Upstream>) -> Result<(), StoreError> {
        let mut errors = Vec::new();
        let mut checked = Vec::with_capacity(routes.len());
        for route in routes {
            match checked_route(route) {
                Ok(route) => checked.push(route),
                Err(StoreError::Invalid(e)) => errors.extend(e),
                Err(other) => return Err(other),
            }
        }
        for upstream in &upstreams {
            errors.extend(validate_upstream(upstream));
        }
        if !errors.is_empty() {
            return Err(StoreError::Invalid(errors));
        }

        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.routes = checked;
        data.upstreams = upstreams;
        Ok(())
    }

    /// All routes, disabled ones included.
    pub fn routes(&self) -> Vec<Route> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .routes
            .clone()
    }

    /// All upstreams, disabled ones included.
    pub fn upstreams(&self) -> Vec<Upstream> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .upstreams
            .clone()
    }

    /// Enabled routes and upstreams taken under a single read lock.
    pub fn enabled(&self) -> (Vec<Route>, Vec<Upstream>) {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        let routes = data.routes.iter().filter(|r| r.enabled).cloned().collect();
        let upstreams = data.upstreams.iter().filter(|u| u.enabled).cloned().collect();
        (routes, upstreams)
    }
}

fn checked_route(route: Route) -> Result<Route, StoreError> {
    let errors = validate_route(&route);
    if errors.is_empty() {
        Ok(route.normalized())
    } else {
        Err(StoreError::Invalid(errors))
    }
}

#[async_trait]
impl RouteStore for MemoryStore {
    async fn list_enabled_routes(&self) -> Result<Vec<Route>, StoreError> {
        Ok(self.routes().into_iter().filter(|r| r.enabled).collect())
    }
}

#[async_trait]
impl UpstreamStore for MemoryStore {
    async fn list_enabled_upstreams(&self) -> Result<Vec<Upstream>, StoreError> {
        Ok(self.upstreams().into_iter().filter(|u| u.enabled).collect())
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn list_enabled(&self) -> Result<(Vec<Route>, Vec<Upstream>), StoreError> {
        Ok(self.enabled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MatchType, Transform};

    #[tokio::test]
    async fn test_lists_enabled_only() {
        let store = MemoryStore::seeded(
            vec![Route::new("a", "/a", "u"), Route::new("b", "/b", "u").disabled()],
            vec![Upstream::new("u", "http://u/")],
        )
        .unwrap();

        let ids: Vec<_> = store
            .list_enabled_routes()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["a"]);
        assert_eq!(store.routes().len(), 2);
    }

    #[tokio::test]
    async fn test_put_rejects_invalid_records() {
        let store = MemoryStore::new();

        let err = store
            .put_route(Route::new("bad", "/(", "u").with_match_type(MatchType::Regex))
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));

        let err = store.put_upstream(Upstream::new("bad", "relative")).unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));

        assert!(store.list_enabled_routes().await.unwrap().is_empty());
        assert!(store.list_enabled_upstreams().await.unwrap().is_empty());
    }

    #[test]
    fn test_put_rejects_regex_the_matcher_cannot_compile() {
        let store = MemoryStore::new();
        let err = store
            .put_route(Route::new("x", "(?x)a #c", "u").with_match_type(MatchType::Regex))
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
        assert!(store.routes().is_empty());
    }

    #[test]
    fn test_enabled_view_is_consistent_across_replace_all() {
        let blue = (vec![Route::new("r", "/r", "blue")], vec![Upstream::new("blue", "http://b/")]);
        let green = (vec![Route::new("r", "/r", "green")], vec![Upstream::new("green", "http://g/")]);
        let store = MemoryStore::seeded(blue.0.clone(), blue.1.clone()).unwrap();
        let done = std::sync::atomic::AtomicBool::new(false);

        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..2000 {
                    let (routes, upstreams) = if i % 2 == 0 { green.clone() } else { blue.clone() };
                    store.replace_all(routes, upstreams).unwrap();
                }
                done.store(true, std::sync::atomic::Ordering::SeqCst);
            });
            while !done.load(std::sync::atomic::Ordering::SeqCst) {
                let (routes, upstreams) = store.enabled();
                assert_eq!(routes.len(), 1);
                assert_eq!(upstreams.len(), 1);
                assert_eq!(routes[0].upstream_id, upstreams[0].id);
            }
        });
    }

    #[test]
    fn test_update_keeps_load_order() {
        let store = MemoryStore::new();
        store.put_route(Route::new("a", "/a", "u")).unwrap();
        store.put_route(Route::new("b", "/b", "u")).unwrap();
        store.put_route(Route::new("a", "/a2", "u")).unwrap();

        let routes = store.routes();
        assert_eq!(routes[0].id, "a");
        assert_eq!(routes[0].path_pattern, "/a2");
        assert_eq!(routes[1].id, "b");
    }

    #[test]
    fn test_writes_are_normalized() {
        let store = MemoryStore::new();
        let mut route = Route::new("a", "/a", "u").with_methods(&["get"]);
        route.request_transform = Some(Transform::default());
        store.put_route(route).unwrap();

        let stored = &store.routes()[0];
        assert_eq!(stored.methods, vec!["GET"]);
        assert!(stored.request_transform.is_none());
    }

    #[test]
    fn test_replace_all_is_all_or_nothing() {
        let store = MemoryStore::seeded(vec![Route::new("a", "/a", "u")], vec![]).unwrap();

        let err = store
            .replace_all(vec![Route::new("b", "/b", "u"), Route::new("c", "", "u")], vec![])
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(ref e) if e.len() == 1));
        assert_eq!(store.routes()[0].id, "a");
    }

    #[test]
    fn test_remove() {
        let store = MemoryStore::seeded(
            vec![Route::new("a", "/a", "u")],
            vec![Upstream::new("u", "http://u/")],
        )
        .unwrap();
        assert_eq!(store.remove_route("a").unwrap().id, "a");
        assert!(matches!(store.remove_route("a"), Err(StoreError::NotFound { .. })));
        assert_eq!(store.remove_upstream("u").unwrap().id, "u");
    }
}
