//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to internal events
//! - Trigger appropriate actions (shutdown, reload)
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP triggers a manual cache reload, not shutdown
//! - A failed reload is logged; the previous snapshot keeps serving

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::lifecycle::shutdown::Shutdown;
use crate::service::RouteService;

/// Wait for Ctrl+C or SIGTERM, then trigger shutdown.
pub async fn wait_for_shutdown(shutdown: Arc<Shutdown>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Ctrl+C received"),
        _ = terminate => tracing::info!("SIGTERM received"),
    }
    tracing::info!("Shutdown signal received");
    shutdown.trigger();
}

/// Reload the configuration cache on every SIGHUP until shutdown.
#[cfg(unix)]
pub async fn reload_on_hangup(service: Arc<RouteService>, mut shutdown: broadcast::Receiver<()>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(sig) => sig,
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for SIGHUP");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = hangup.recv() => {
                tracing::info!("SIGHUP received, reloading");
                match service.reload().await {
                    Ok(outcome) => tracing::info!(?outcome, "Reload finished"),
                    Err(e) => tracing::error!(error = %e, "Reload failed"),
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

#[cfg(not(unix))]
pub async fn reload_on_hangup(_service: Arc<RouteService>, mut shutdown: broadcast::Receiver<()>) {
    let _ = shutdown.recv().await;
}
