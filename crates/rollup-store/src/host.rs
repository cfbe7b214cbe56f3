//! SQLite-backed host
//!
//! One connection serves every host trait: records and parent writes
//! (`records`), definitions (`definitions`), and the job ledger with its
//! chunk queue (`jobs`).

use std::path::Path;

use rollup_core::model::SchemaRegistry;
use rusqlite::Connection;

use crate::db;
use crate::errors::Result;
use crate::migrations::apply_migrations;

pub struct SqliteHost {
    pub(crate) conn: Connection,
    /// When set, rows are read back as the schema's field types
    pub(crate) schema: Option<SchemaRegistry>,
}

impl SqliteHost {
    /// Open (or create) a database file and bring its schema up to date
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_connection(db::open_file(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(db::open_memory()?)
    }

    /// Wrap an existing connection, applying pending migrations
    pub fn from_connection(mut conn: Connection) -> Result<Self> {
        apply_migrations(&mut conn)?;
        Ok(Self { conn, schema: None })
    }

    /// Read stored JSON back through `schema`, so dates and long decimals
    /// come back typed instead of as text
    pub fn with_schema(mut self, schema: SchemaRegistry) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

impl std::fmt::Debug for SqliteHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteHost")
            .field("path", &self.conn.path())
            .finish()
    }
}
