//! Configuration file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};

use crate::cache::MemoryStore;
use crate::config::loader::load_config;
use crate::config::schema::GatewayConfig;
use crate::expr::ExprEngine;
use crate::service::RouteService;

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    engine: Arc<dyn ExprEngine>,
    update_tx: mpsc::UnboundedSender<GatewayConfig>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for validated configurations.
    pub fn new(
        path: &Path,
        engine: Arc<dyn ExprEngine>,
    ) -> (Self, mpsc::UnboundedReceiver<GatewayConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                engine,
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file in a background thread.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();
        let engine = self.engine.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!("Config file change detected, reloading...");
                        match load_config(&path, engine.as_ref()) {
                            Ok(new_config) => {
                                let _ = tx.send(new_config);
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
                            }
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// Push every received configuration into the store and reload the cache.
///
/// Only routes and upstreams take effect; other sections need a restart.
pub async fn apply_updates(
    mut updates: mpsc::UnboundedReceiver<GatewayConfig>,
    store: Arc<MemoryStore>,
    service: Arc<RouteService>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        let config = tokio::select! {
            update = updates.recv() => match update {
                Some(config) => config,
                None => break,
            },
            _ = shutdown.recv() => break,
        };

        if let Err(e) = store.replace_all(config.routes, config.upstreams) {
            tracing::error!(error = %e, "Rejected configuration update");
            continue;
        }
        match service.reload().await {
            Ok(outcome) => tracing::info!(?outcome, "Configuration applied"),
            Err(e) => tracing::error!(error = %e, "Reload after configuration change failed"),
        }
    }
    tracing::debug!("Config update loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheSettings, ConfigCache};
    use crate::expr::{EnvExpander, RhaiEngine};
    use crate::model::{Route, Upstream};

    #[tokio::test]
    async fn test_apply_updates_reloads_cache() {
        let store = Arc::new(
            MemoryStore::seeded(
                vec![Route::new("a", "/a", "u")],
                vec![Upstream::new("u", "http://u/")],
            )
            .unwrap(),
        );
        let cache = Arc::new(ConfigCache::from_store(store.clone(), CacheSettings::default()));
        cache.start().await.unwrap();
        let service = Arc::new(RouteService::from_cache(
            cache.clone(),
            Arc::new(RhaiEngine::default()),
            EnvExpander::default(),
        ));

        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(apply_updates(rx, store.clone(), service.clone(), shutdown_rx));

        let config = GatewayConfig {
            routes: vec![Route::new("b", "/b", "u")],
            upstreams: vec![Upstream::new("u", "http://u/")],
            ..Default::default()
        };
        tx.send(config).unwrap();

        // Rejected: empty route id.
        let bad = GatewayConfig {
            routes: vec![Route::new("", "/c", "u")],
            ..Default::default()
        };
        tx.send(bad).unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(cache.generation(), 2);
        let snap = service.snapshot();
        assert!(snap.route("b").is_some());
        assert!(snap.route("a").is_none());
        drop(shutdown_tx);
    }
}
