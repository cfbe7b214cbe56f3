//! Rollup Engine - orchestration over a rollup host
//!
//! Public operations (recalculation, job status, discovery) are methods on
//! [`RollupEngine`]. They are also reachable as data through
//! [`commands::engine_command`] and [`commands::engine_query`], which is how
//! the CLI drives the engine.

pub mod commands;
pub mod engine;
pub mod poller;

pub use commands::discovery::DefinitionsByType;
pub use commands::jobs::JobStatusReport;
pub use commands::recalc::{JobTicket, ParentRef};
pub use engine::RollupEngine;
pub use poller::{JobPoller, PollOutcome};
