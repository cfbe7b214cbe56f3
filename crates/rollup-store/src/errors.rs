//! Error handling for rollup-store
//!
//! Store operations return `ExError`. Host trait implementations return the
//! core `RollupError`, so SQLite failures are also mapped to `DataAccess`.

use rollup_core::errors::{ExError, ExErrorKind, RollupError};
use std::fmt::Display;

pub type Result<T> = std::result::Result<T, ExError>;

fn store_error(kind: ExErrorKind, op: &str, message: impl Into<String>) -> ExError {
    ExError::new(kind).with_op(op.to_string()).with_message(message)
}

/// A migration script that SQLite refused
pub fn migration_error(migration_id: &str, reason: &str) -> ExError {
    store_error(
        ExErrorKind::Persistence,
        "migration",
        format!("migration {migration_id} did not apply: {reason}"),
    )
}

/// An applied migration whose embedded script has since changed
pub fn checksum_mismatch(migration_id: &str, recorded: &str, embedded: &str) -> ExError {
    store_error(
        ExErrorKind::Persistence,
        "migration_checksum",
        format!("Checksum mismatch for migration {migration_id}: recorded {recorded}, embedded {embedded}"),
    )
}

pub fn from_rusqlite(err: rusqlite::Error) -> ExError {
    store_error(ExErrorKind::Persistence, "sqlite", err.to_string())
}

/// Stored JSON that no longer parses
pub fn corrupt_row(op: &str, err: impl Display) -> ExError {
    store_error(ExErrorKind::Serialization, op, format!("Invalid stored JSON: {err}"))
}

pub fn not_found(op: &str, what: impl Into<String>) -> ExError {
    store_error(ExErrorKind::NotFound, op, what)
}

/// Map a SQLite failure inside a host trait call
pub(crate) fn data_access(op: &str) -> impl Fn(rusqlite::Error) -> RollupError + '_ {
    move |e| RollupError::data_access(op, e.to_string())
}

/// Map a JSON failure inside a host trait call
pub(crate) fn data_corrupt(op: &str) -> impl Fn(serde_json::Error) -> RollupError + '_ {
    move |e| RollupError::data_access(op, format!("invalid stored JSON: {e}"))
}
