//! Upstream subsystem.
//!
//! # Data Flow
//! ```text
//! matched route → upstream id
//!     → snapshot upstream map (Upstream record)
//!     → resolver.rs (base URL + path + query → outbound URL)
//!     → resolver.rs (auth injection, ${NAME} expansion)
//!     → client.rs (pooled client owned by the snapshot)
//!     → forward
//! ```
//!
//! # Design Decisions
//! - Resolution and auth are pure functions of the upstream record
//! - Secrets are expanded per request, never cached at load time
//! - Each snapshot owns its clients; old pools drain with old snapshots

pub mod client;
pub mod resolver;

pub use client::{UpstreamClient, UpstreamClients};
pub use resolver::{ResolveError, UpstreamResolver};
