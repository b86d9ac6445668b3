//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → Broadcast → Listeners drain → Background tasks exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Manual cache reload
//! ```
//!
//! # Design Decisions
//! - Ordered startup lives in main: config, cache, tasks, listeners
//! - Every long-running task subscribes to the same broadcast

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
