//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, proxy handler)
//!     → request.rs (request ID, body limit, hop-by-hop headers)
//!     → [route service prepares the outbound request]
//!     → upstream client (per snapshot)
//!     → response.rs (error bodies, upstream response conversion)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
