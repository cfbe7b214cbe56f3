use rusqlite::{Connection, OptionalExtension, Transaction};

use super::{Migration, MIGRATIONS};
use crate::errors::{checksum_mismatch, from_rusqlite, migration_error, Result};

const LEDGER_DDL: &str = "CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY,
    migration_id TEXT NOT NULL UNIQUE,
    applied_at INTEGER NOT NULL,
    checksum TEXT
)";

/// Bring the database up to the latest embedded schema
///
/// Each pending migration runs in its own transaction together with its
/// ledger row. Fails without applying anything further if a recorded
/// checksum disagrees with the embedded script.
pub fn apply_migrations(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(LEDGER_DDL).map_err(from_rusqlite)?;

    let mut applied = 0usize;
    for migration in MIGRATIONS {
        let tx = conn.transaction().map_err(from_rusqlite)?;
        if apply_one(&tx, migration)? {
            tx.commit().map_err(from_rusqlite)?;
            applied += 1;
        }
    }
    if applied > 0 {
        tracing::debug!(applied, "schema migrated");
    }
    Ok(())
}

/// Ids recorded in `schema_version`, oldest first
pub fn applied_migrations(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT migration_id FROM schema_version ORDER BY id")
        .map_err(from_rusqlite)?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(from_rusqlite)?;
    rows.collect::<std::result::Result<_, _>>().map_err(from_rusqlite)
}

/// Returns whether the script ran; an already-applied script is verified only
fn apply_one(tx: &Transaction<'_>, migration: &Migration) -> Result<bool> {
    let checksum = migration.checksum();
    let recorded: Option<Option<String>> = tx
        .query_row(
            "SELECT checksum FROM schema_version WHERE migration_id = ?1",
            [migration.id],
            |row| row.get(0),
        )
        .optional()
        .map_err(from_rusqlite)?;

    match recorded {
        Some(Some(stored)) if stored != checksum => {
            Err(checksum_mismatch(migration.id, &stored, &checksum))
        }
        Some(_) => Ok(false),
        None => {
            tx.execute_batch(migration.sql)
                .map_err(|e| migration_error(migration.id, &e.to_string()))?;
            tx.execute(
                "INSERT INTO schema_version (migration_id, applied_at, checksum) VALUES (?1, ?2, ?3)",
                rusqlite::params![migration.id, chrono::Utc::now().timestamp(), checksum],
            )
            .map_err(from_rusqlite)?;
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn migrated() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_migrations(&mut conn).unwrap();
        conn
    }

    #[test]
    fn test_second_run_is_a_no_op() {
        let mut conn = migrated();
        apply_migrations(&mut conn).unwrap();
        assert_eq!(applied_migrations(&conn).unwrap().len(), MIGRATIONS.len());
    }

    #[test]
    fn test_edited_migration_is_rejected() {
        let mut conn = migrated();
        conn.execute(
            "UPDATE schema_version SET checksum = 'deadbeef' WHERE migration_id = '001_records'",
            [],
        )
        .unwrap();

        let err = apply_migrations(&mut conn).unwrap_err();
        assert!(err.to_string().contains("Checksum mismatch"));
    }

    #[test]
    fn test_partially_migrated_database_catches_up() {
        let mut conn = migrated();
        conn.execute_batch("DROP TABLE profiles").unwrap();
        conn.execute(
            "DELETE FROM schema_version WHERE migration_id = '004_profiles'",
            [],
        )
        .unwrap();

        apply_migrations(&mut conn).unwrap();
        let ids = applied_migrations(&conn).unwrap();
        assert_eq!(ids.last().map(String::as_str), Some("004_profiles"));
    }
}
