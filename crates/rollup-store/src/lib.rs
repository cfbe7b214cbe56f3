//! Rollup Store - SQLite persistence for the rollup engine
//!
//! Provides:
//! - SQLite schema with a checksummed migrations framework
//! - `SqliteHost`, implementing every host trait over one connection
//! - Definition repository, job ledger and chunk queue
//! - Engine configuration profiles

pub mod db;
pub mod definitions;
pub mod errors;
pub mod host;
pub mod jobs;
pub mod migrations;
pub mod profile;
pub mod records;

// Re-export key types
pub use errors::Result;
pub use host::SqliteHost;
pub use profile::load_engine_config;
