//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters, gauges, histograms via `metrics`)
//!
//! Consumers:
//!     → stdout (pretty or JSON lines)
//!     → Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every log event on the proxy path
//! - Recorders are free functions; with no exporter installed they are no-ops
//! - `RUST_LOG` always wins over the configured level

pub mod logging;
pub mod metrics;
