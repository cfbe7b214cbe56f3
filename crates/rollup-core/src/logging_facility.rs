//! Structured logging for the rollup engine
//!
//! Every public engine operation logs exactly one start event and exactly one
//! end (or end_error) event through the macros below. Inner layers (planner,
//! evaluator, writer) log at debug/trace level only and never emit boundary
//! events of their own.
//!
//! # Usage
//!
//! ```rust
//! use rollup_core::logging_facility::{init, Profile};
//!
//! init(Profile::Development);
//! ```
//!
//! - `log_op_start!(op, ...)` at entry
//! - `log_op_end!(op, duration_ms = ...)` on success
//! - `log_op_error!(op, err, duration_ms = ...)` on failure

pub mod init;
pub mod macros;
pub mod test_capture;

pub use init::{init, Profile};
pub use test_capture::{init_test_capture, CapturedEvent, TestCapture};
