//! Routing data model.
//!
//! # Data Flow
//! ```text
//! admin collaborator / config file
//!     → Route, Upstream (validated at write time)
//!     → store (list_enabled_*)
//!     → cache snapshot (normalized, immutable)
//!     → matcher, transform, resolver, metering
//! ```
//!
//! # Design Decisions
//! - Records are plain values; the core never mutates them
//! - Closed enums for match type, protocol, metering mode and auth
//! - An empty transform is normalized to "no transform"

pub mod route;
pub mod transform;
pub mod upstream;

pub use route::{MatchType, MeteringMode, Protocol, Route, DEFAULT_METERING_EXPR};
pub use transform::Transform;
pub use upstream::{Upstream, UpstreamAuth, REDACTED};
