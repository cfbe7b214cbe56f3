//! Schema migrations
//!
//! The SQL files under `migrations/` are compiled in. Each is applied once,
//! in catalog order, and its SHA-256 is recorded so a later edit to an
//! already-applied script is caught instead of silently diverging.

mod runner;

use sha2::{Digest, Sha256};

pub use runner::{applied_migrations, apply_migrations};

/// One embedded migration script
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub id: &'static str,
    pub sql: &'static str,
}

impl Migration {
    /// Hex SHA-256 of the script text
    pub fn checksum(&self) -> String {
        hex::encode(Sha256::digest(self.sql.as_bytes()))
    }
}

macro_rules! embed {
    ($($id:literal),+ $(,)?) => {
        &[$(Migration {
            id: $id,
            sql: include_str!(concat!("../../migrations/", $id, ".sql")),
        }),+]
    };
}

/// Every migration, in application order
pub const MIGRATIONS: &[Migration] = embed![
    "001_records",
    "002_definitions",
    "003_jobs",
    "004_profiles",
];
