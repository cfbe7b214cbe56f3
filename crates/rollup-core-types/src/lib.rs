//! Core types shared across the rollup crates
//!
//! This crate provides foundational types used by the error handling,
//! logging and orchestration layers:
//!
//! - **Correlation types**: RequestId, TraceId, RequestContext
//! - **Schema constants**: Canonical structured-log field keys and event names

pub mod correlation;
pub mod schema;

pub use correlation::{RequestContext, RequestId, TraceId};
