//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, expression syntax)
//!     → GatewayConfig (validated)
//!     → routes/upstreams seed the store, the rest configures subsystems
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads and validates
//!     → store.replace_all (all-or-nothing)
//!     → manual cache reload publishes a new snapshot
//! ```
//!
//! # Design Decisions
//! - Only routes and upstreams hot reload; listeners need a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, CacheConfig, ExpressionConfig, GatewayConfig, ListenerConfig, LogFormat,
    MeteringConfig, ObservabilityConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
