//! API gateway core: route matching, request/response transformation,
//! upstream forwarding with credential injection, usage metering and a
//! hot-reloaded configuration cache.

pub mod admin;
pub mod cache;
pub mod config;
pub mod expr;
pub mod http;
pub mod lifecycle;
pub mod metering;
pub mod model;
pub mod observability;
pub mod routing;
pub mod service;
pub mod transform;
pub mod upstream;

pub use config::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use service::RouteService;
