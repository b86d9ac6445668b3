//! Metering subsystem.
//!
//! # Data Flow
//! ```text
//! route.metering_expr + EvalContext (request, or request + response)
//!     → evaluator.rs (numeric value, default 1 on any failure)
//!     → usage.rs (UsageRecord → UsageSink)
//!     → billing collaborator
//! ```
//!
//! # Design Decisions
//! - Metering never blocks traffic: every failure degrades to one unit
//! - Constant expressions skip the engine entirely

pub mod evaluator;
pub mod usage;

pub use evaluator::{MeteringEvaluator, MeteringOutcome, DEFAULT_METERING_VALUE};
pub use usage::{TracingUsageSink, UsageRecord, UsageSink};
