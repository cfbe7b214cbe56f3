pub mod context;
pub mod definitions;
pub mod jobs;
pub mod namespace;
pub mod recalc;
pub mod records;
