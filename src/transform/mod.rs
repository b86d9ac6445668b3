//! Request/response transform subsystem.
//!
//! # Data Flow
//! ```text
//! matched route + RequestContext
//!     → path rewrite (expression → outbound path)
//!     → request transform: set headers/query → delete headers/query → body
//!     → forwarded request
//!
//! upstream response
//!     → response transform: set headers → delete headers → body
//!     → client response
//! ```
//!
//! # Design Decisions
//! - Every field is evaluated independently; a failed field is recorded and
//!   skipped while the remaining fields still apply
//! - Fixed order: Set before Delete, body last
//! - `${NAME}` placeholders in set values are expanded at evaluation time

pub mod evaluator;

pub use evaluator::{FieldError, TransformEvaluator, TransformOutput};
