//! Route service façade.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → snapshot() (one lock-free load per request)
//!     → match_request (route + params)
//!     → prepare (rewrite, method override, request transform,
//!                URL resolution, auth injection)
//!     → [proxy forwards | dry run reports]
//!     → finish (response transform, metering)
//! ```
//!
//! # Design Decisions
//! - One pipeline serves real traffic and the dry run
//! - The service owns no mutable state; the cache does
//! - Expression failures become field errors, never request failures

pub mod dry_run;
pub mod route_service;

pub use dry_run::{TestRouteRequest, TestRouteResponse, ValidationResult};
pub use route_service::{PrepareError, PreparedRequest, RouteService, ServiceError};
