//! API gateway (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────▶ http server ──▶ route service ──▶ upstream client ──▶ Upstream
//!                     │               │
//!                     │          config cache ◀── store ◀── config file / admin / SIGHUP
//!                     │               │
//!     ◀────────── response transform + usage record
//! ```
//!
//! Startup order: config, logging, metrics, store, initial cache load
//! (fatal on error), background tasks, admin listener, proxy listener.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use apigate::admin::{resolve_api_key, setup_admin_router, AdminState};
use apigate::cache::{CacheSettings, ConfigCache, MemoryStore};
use apigate::config::watcher::{apply_updates, ConfigWatcher};
use apigate::config::{load_config, GatewayConfig};
use apigate::expr::{EnvExpander, ExprEngine, RhaiEngine};
use apigate::http::HttpServer;
use apigate::lifecycle::{signals, Shutdown};
use apigate::metering::TracingUsageSink;
use apigate::observability::{logging, metrics};
use apigate::service::RouteService;

#[derive(Parser)]
#[command(name = "apigate")]
#[command(about = "API gateway", long_about = None)]
struct Cli {
    /// Configuration file (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // The engine validates expressions while the config loads.
    let bootstrap = RhaiEngine::default();
    let config = match &cli.config {
        Some(path) => load_config(path, &bootstrap)?,
        None => GatewayConfig::default(),
    };

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "apigate starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let engine: Arc<dyn ExprEngine> = Arc::new(RhaiEngine::new(config.expressions.limits.clone()));
    let env = EnvExpander::default().with_policy(config.expressions.missing_env);

    // Initial load: a gateway without a snapshot must not serve.
    let store = Arc::new(MemoryStore::seeded(config.routes.clone(), config.upstreams.clone())?);
    let cache = Arc::new(ConfigCache::from_store(
        store.clone(),
        CacheSettings::from(&config.cache),
    ));
    let generation = cache.start().await?;
    tracing::info!(
        generation,
        routes = config.routes.len(),
        upstreams = config.upstreams.len(),
        "Configuration loaded"
    );

    let service = Arc::new(RouteService::from_cache(cache.clone(), engine.clone(), env.clone()));
    let shutdown = Arc::new(Shutdown::new());

    // Background tasks
    tokio::spawn(cache.clone().run(shutdown.subscribe()));
    tokio::spawn(signals::reload_on_hangup(service.clone(), shutdown.subscribe()));
    tokio::spawn(signals::wait_for_shutdown(shutdown.clone()));

    let _watcher = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path, engine.clone());
            tokio::spawn(apply_updates(updates, store.clone(), service.clone(), shutdown.subscribe()));
            match watcher.run() {
                Ok(w) => Some(w),
                Err(e) => {
                    tracing::error!(error = %e, "Config watcher unavailable, hot reload disabled");
                    None
                }
            }
        }
        None => None,
    };

    if config.admin.enabled {
        let api_key = resolve_api_key(&env, &config.admin.api_key)?;
        let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
        let router = setup_admin_router(AdminState {
            service: service.clone(),
            api_key,
        });
        let mut admin_shutdown = shutdown.subscribe();
        tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");
        tokio::spawn(async move {
            let served = axum::serve(admin_listener, router)
                .with_graceful_shutdown(async move {
                    let _ = admin_shutdown.recv().await;
                })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "Admin API stopped");
            }
        });
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(&config, service, Arc::new(TracingUsageSink));
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
