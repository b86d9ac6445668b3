//! Snapshot publication and periodic refresh.
//!
//! # Responsibilities
//! - Perform the initial (fatal) load
//! - Rebuild and publish snapshots on a timer and on demand
//! - Keep the previous snapshot on any failure or timeout
//!
//! # Design Decisions
//! - `ArcSwap` gives readers a wait-free load of the current snapshot
//! - A tokio mutex serializes reloads; scheduled reloads use `try_lock`
//! - A timed-out reload is dropped, not retried until the next tick

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::time::{self, MissedTickBehavior};

use crate::cache::clock::{unix_millis, Clock, SystemClock};
use crate::cache::snapshot::{Snapshot, SnapshotError, SnapshotSource};
use crate::cache::store::{ConfigStore, RouteStore, StoreError, UpstreamStore};
use crate::config::schema::CacheConfig;
use crate::model::{Route, Upstream};
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("snapshot build failed: {0}")]
    Build(#[from] SnapshotError),

    #[error("reload timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheState {
    Empty,
    Loading,
    Ready,
}

impl CacheState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => CacheState::Loading,
            2 => CacheState::Ready,
            _ => CacheState::Empty,
        }
    }
}

/// What caused a reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadTrigger {
    /// Timer tick; skipped if another reload is running.
    Scheduled,
    /// Admin action, signal or file change; waits for a running reload.
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReloadOutcome {
    Published { generation: u64 },
    Skipped,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub refresh_interval: Duration,
    pub reload_timeout: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for CacheSettings {
    fn from(config: &CacheConfig) -> Self {
        Self {
            refresh_interval: Duration::from_secs(config.refresh_interval_secs),
            reload_timeout: Duration::from_secs(config.reload_timeout_secs),
        }
    }
}

/// Point-in-time view of the cache for admin tooling.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub state: CacheState,
    pub generation: u64,
    pub routes: usize,
    pub upstreams: usize,
    /// Unix millis of the current snapshot's build.
    pub built_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Where a rebuild reads its records from.
enum Records {
    /// Two independent stores, read one after the other.
    Split {
        routes: Arc<dyn RouteStore>,
        upstreams: Arc<dyn UpstreamStore>,
    },
    /// One store that returns both sets from the same state.
    Consistent(Arc<dyn ConfigStore>),
}

impl Records {
    async fn list_enabled(&self) -> Result<(Vec<Route>, Vec<Upstream>), StoreError> {
        match self {
            Records::Split { routes, upstreams } => {
                let routes = routes.list_enabled_routes().await?;
                let upstreams = upstreams.list_enabled_upstreams().await?;
                Ok((routes, upstreams))
            }
            Records::Consistent(store) => store.list_enabled().await,
        }
    }
}

/// The lock-free configuration cache.
pub struct ConfigCache {
    records: Records,
    clock: Arc<dyn Clock>,
    settings: CacheSettings,
    current: ArcSwap<Snapshot>,
    state: AtomicU8,
    reload_lock: Mutex<()>,
    last_error: RwLock<Option<String>>,
}

impl std::fmt::Debug for ConfigCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigCache")
            .field("state", &self.state())
            .field("generation", &self.current.load().generation)
            .field("settings", &self.settings)
            .finish()
    }
}

impl ConfigCache {
    /// Cache over separate route and upstream stores.
    pub fn new(
        routes: Arc<dyn RouteStore>,
        upstreams: Arc<dyn UpstreamStore>,
        settings: CacheSettings,
    ) -> Self {
        Self::with_records(Records::Split { routes, upstreams }, settings)
    }

    /// Cache over a store that lists both record sets in one read.
    pub fn from_store(store: Arc<dyn ConfigStore>, settings: CacheSettings) -> Self {
        Self::with_records(Records::Consistent(store), settings)
    }

    fn with_records(records: Records, settings: CacheSettings) -> Self {
        Self {
            records,
            clock: Arc::new(SystemClock),
            settings,
            current: ArcSwap::from_pointee(Snapshot::empty()),
            state: AtomicU8::new(CacheState::Empty as u8),
            reload_lock: Mutex::new(()),
            last_error: RwLock::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn state(&self) -> CacheState {
        CacheState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn generation(&self) -> u64 {
        self.current.load().generation
    }

    /// Initial synchronous load. An error here should stop the process.
    pub async fn start(&self) -> Result<u64, CacheError> {
        match self.reload(ReloadTrigger::Manual).await? {
            ReloadOutcome::Published { generation } => {
                tracing::info!(generation, "Configuration cache ready");
                Ok(generation)
            }
            // Manual reloads wait for the lock and always publish or fail.
            ReloadOutcome::Skipped => Ok(self.generation()),
        }
    }

    /// Rebuild and publish a snapshot.
    ///
    /// On error the previous snapshot stays published.
    pub async fn reload(&self, trigger: ReloadTrigger) -> Result<ReloadOutcome, CacheError> {
        let _guard = match trigger {
            ReloadTrigger::Manual => self.reload_lock.lock().await,
            ReloadTrigger::Scheduled => match self.reload_lock.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    tracing::debug!("Reload already in progress, skipping scheduled refresh");
                    metrics::record_reload("skipped", Duration::ZERO);
                    return Ok(ReloadOutcome::Skipped);
                }
            },
        };

        let previous = self.state();
        self.set_state(CacheState::Loading);
        let started = Instant::now();

        let result = match time::timeout(self.settings.reload_timeout, self.build_next()).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout(self.settings.reload_timeout)),
        };

        match result {
            Ok(snapshot) => {
                let generation = snapshot.generation;
                metrics::record_snapshot(generation, snapshot.routes.len(), snapshot.upstreams.len());
                tracing::info!(
                    generation,
                    routes = snapshot.routes.len(),
                    upstreams = snapshot.upstreams.len(),
                    ?trigger,
                    "Published configuration snapshot"
                );
                self.current.store(Arc::new(snapshot));
                self.set_state(CacheState::Ready);
                *self.last_error.write().unwrap_or_else(PoisonError::into_inner) = None;
                metrics::record_reload("published", started.elapsed());
                Ok(ReloadOutcome::Published { generation })
            }
            Err(e) => {
                let outcome = if matches!(e, CacheError::Timeout(_)) {
                    "timeout"
                } else {
                    "failed"
                };
                tracing::error!(
                    error = %e,
                    ?trigger,
                    generation = self.generation(),
                    "Configuration reload failed, keeping current snapshot"
                );
                self.set_state(previous);
                *self.last_error.write().unwrap_or_else(PoisonError::into_inner) = Some(e.to_string());
                metrics::record_reload(outcome, started.elapsed());
                Err(e)
            }
        }
    }

    async fn build_next(&self) -> Result<Snapshot, CacheError> {
        let (routes, upstreams) = self.records.list_enabled().await?;
        let generation = self.current.load().generation + 1;
        Ok(Snapshot::build(generation, routes, upstreams, self.clock.now())?)
    }

    fn set_state(&self, state: CacheState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn status(&self) -> CacheStatus {
        let snap = self.current.load();
        CacheStatus {
            state: self.state(),
            generation: snap.generation,
            routes: snap.routes.len(),
            upstreams: snap.upstreams.len(),
            built_at: unix_millis(snap.built_at),
            last_error: self
                .last_error
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    /// Age of the current snapshot according to the cache clock.
    pub fn snapshot_age(&self) -> Duration {
        let built_at = self.current.load().built_at;
        self.clock
            .now()
            .duration_since(built_at)
            .unwrap_or_default()
    }

    /// Refresh loop. Runs until `shutdown` fires.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let period = self.settings.refresh_interval;
        tracing::info!(interval_secs = period.as_secs(), "Configuration refresher starting");

        let mut ticker = time::interval_at(time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Failures are logged inside reload and retried next tick.
                    let _ = self.reload(ReloadTrigger::Scheduled).await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Configuration refresher received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

impl SnapshotSource for ConfigCache {
    fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }
}
