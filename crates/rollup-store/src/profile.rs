//! Engine configuration profiles
//!
//! A profile is a named `EngineConfig` stored as JSON. One profile may be
//! marked as the default.

use rollup_core::EngineConfig;
use rusqlite::{Connection, OptionalExtension};

use crate::errors::{corrupt_row, from_rusqlite, not_found, Result};

/// Stored payload of `profile_ref`, parsed; `None` when no such row exists
pub fn load_profile_payload(conn: &Connection, profile_ref: &str) -> Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT payload_json FROM profiles WHERE profile_ref = ?1",
            [profile_ref],
            |row| row.get(0),
        )
        .optional()
        .map_err(from_rusqlite)?;

    raw.map(|s| serde_json::from_str(&s).map_err(|e| corrupt_row("load_profile_payload", e)))
        .transpose()
}

fn default_profile_ref(conn: &Connection) -> Result<Option<String>> {
    conn.query_row(
        "SELECT profile_ref FROM profiles WHERE is_default = 1 ORDER BY created_at LIMIT 1",
        [],
        |row| row.get(0),
    )
    .optional()
    .map_err(from_rusqlite)
}

/// Resolve the engine configuration for `profile_ref`
///
/// With no ref, the default profile is used, or `EngineConfig::default()`
/// when none is marked. An explicitly requested profile that does not exist
/// is a NotFound error.
pub fn load_engine_config(conn: &Connection, profile_ref: Option<&str>) -> Result<EngineConfig> {
    let (profile_ref, explicit) = match profile_ref {
        Some(r) => (Some(r.to_string()), true),
        None => (default_profile_ref(conn)?, false),
    };
    let Some(profile_ref) = profile_ref else {
        tracing::debug!("no default profile; using built-in engine config");
        return Ok(EngineConfig::default());
    };

    match load_profile_payload(conn, &profile_ref)? {
        Some(payload) => {
            let config: EngineConfig =
                serde_json::from_value(payload).map_err(|e| corrupt_row("load_engine_config", e))?;
            config.validate()?;
            Ok(config)
        }
        None if explicit => Err(not_found(
            "load_engine_config",
            format!("Profile not found: {}", profile_ref),
        )),
        None => Ok(EngineConfig::default()),
    }
}

/// Store a profile, optionally making it the only default
pub fn save_profile(conn: &mut Connection, profile_ref: &str, config: &EngineConfig, make_default: bool) -> Result<()> {
    config.validate()?;
    let payload = serde_json::to_string(config).map_err(|e| corrupt_row("save_profile", e))?;
    let tx = conn.transaction().map_err(from_rusqlite)?;
    if make_default {
        tx.execute("UPDATE profiles SET is_default = 0", [])
            .map_err(from_rusqlite)?;
    }
    tx.execute(
        "INSERT INTO profiles (profile_ref, payload_json, is_default, created_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(profile_ref) DO UPDATE SET
            payload_json = excluded.payload_json,
            is_default = MAX(profiles.is_default, excluded.is_default)",
        rusqlite::params![profile_ref, payload, make_default, chrono::Utc::now().timestamp()],
    )
    .map_err(from_rusqlite)?;
    tx.commit().map_err(from_rusqlite)?;
    Ok(())
}

pub fn list_profiles(conn: &Connection) -> Result<Vec<(String, bool)>> {
    let mut stmt = conn
        .prepare("SELECT profile_ref, is_default FROM profiles ORDER BY profile_ref")
        .map_err(from_rusqlite)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .map_err(from_rusqlite)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(from_rusqlite)?;
    Ok(rows)
}
