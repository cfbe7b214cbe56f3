pub mod discovery;
pub mod engine_command;
pub mod engine_query;
pub mod jobs;
pub mod recalc;
