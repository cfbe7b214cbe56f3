//! Rollup Core - metadata-driven aggregation kernel
//!
//! This crate provides the in-process half of the rollup engine:
//! - Field values, host schema descriptions and rollup definitions
//! - Metadata resolution with namespace-aware field names
//! - Relationship path resolution for grandparent rollups
//! - The filter language evaluated against calculation items
//! - Query planning, per-operation evaluation, recursion protection
//! - Diffing, batched parent writes and job-state bookkeeping
//!
//! It performs no I/O of its own: records, definitions and job state are
//! reached through the host traits in [`host`].

pub mod config;
pub mod errors;
pub mod evaluator;
pub mod filter;
pub mod guard;
pub mod host;
pub mod jobs;
pub mod logging_facility;
pub mod memory;
pub mod metadata;
pub mod model;
pub mod pipeline;
pub mod planner;
pub mod relationship;
pub mod writer;

// Re-export commonly used types
pub use config::EngineConfig;
pub use errors::{ExError, ExErrorKind, Result, RollupError};
pub use guard::UnitOfWork;
pub use host::{DefinitionSource, JobQueue, JobTracker, RecordSink, RecordSource, RollupHost};
pub use memory::InMemoryHost;
pub use model::{
    FieldDescriptor, FieldType, FieldValue, ObjectSchema, Operation, Record, RollupDefinition,
    SchemaRegistry,
};
