//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path, headers)
//!     → router.rs (ranked route lookup)
//!     → matcher.rs (evaluate path pattern, extract params)
//!     → Return: MatchResult or None
//!
//! Route Compilation (on every cache refresh):
//!     Route[] (enabled only)
//!     → Compile matchers (exact map, prefix, segment, regex)
//!     → Rank by priority, specificity, literal length, load order
//!     → Freeze as immutable RouteMatcher inside the snapshot
//! ```
//!
//! # Design Decisions
//! - Routes compiled off the hot path, immutable at runtime
//! - Deterministic: same input always matches same route
//! - No match is a normal outcome, not an error

pub mod matcher;
pub mod router;

pub use matcher::{PathParams, REMAINDER_PARAM};
pub use router::{MatchResult, RouteBuildError, RouteMatcher};
