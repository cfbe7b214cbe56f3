//! Generic record table
//!
//! Records of every object type live in one table as flat JSON objects.
//! Fetches return rows in insertion order; an upsert keeps a record's
//! original position.

use std::collections::BTreeMap;

use rollup_core::errors::RollupError;
use rollup_core::host::{RecordSink, RecordSource};
use rollup_core::model::{Record, SchemaRegistry};
use rollup_core::writer::{ParentUpdate, WriteOutcome};
use rusqlite::{params_from_iter, Connection, OptionalExtension};

use crate::errors::{corrupt_row, data_access, from_rusqlite, Result};
use crate::host::SqliteHost;

/// Bound parameters per `IN (...)` query
const IN_CHUNK: usize = 500;

type CoreResult<T> = rollup_core::errors::Result<T>;

fn parse_record(
    object_type: &str,
    fields_json: &str,
    schema: Option<&SchemaRegistry>,
) -> std::result::Result<Record, String> {
    let map: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(fields_json).map_err(|e| e.to_string())?;
    let record = Record::from_json(object_type, map).map_err(|e| e.to_string())?;
    Ok(match schema.and_then(|s| s.get(object_type)) {
        Some(object_schema) => record.coerce_with(object_schema),
        None => record,
    })
}

fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

fn write_record(conn: &Connection, record: &Record) -> rusqlite::Result<()> {
    let fields_json = serde_json::Value::Object(record.to_json()).to_string();
    conn.execute(
        "INSERT INTO records (object_type, id, fields_json, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(object_type, id) DO UPDATE SET
            fields_json = excluded.fields_json,
            updated_at = excluded.updated_at",
        rusqlite::params![
            record.object_type,
            record.id,
            fields_json,
            chrono::Utc::now().timestamp()
        ],
    )?;
    Ok(())
}

fn read_record(conn: &Connection, object_type: &str, id: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT fields_json FROM records WHERE object_type = ?1 AND id = ?2",
        [object_type, id],
        |row| row.get(0),
    )
    .optional()
}

impl SqliteHost {
    /// Rows matching `clause` (which may use `?2` onwards), ordered by seq
    fn query_records(&self, op: &str, object_type: &str, clause: &str, values: &[String]) -> CoreResult<Vec<Record>> {
        let mut rows: Vec<(i64, Record)> = Vec::new();
        let empty: &[String] = &[];
        let chunks: Vec<&[String]> = if values.is_empty() {
            vec![empty]
        } else {
            values.chunks(IN_CHUNK).collect()
        };
        for chunk in chunks {
            let sql = format!(
                "SELECT seq, fields_json FROM records WHERE object_type = ?1 {} ORDER BY seq",
                clause.replace("{in}", &placeholders(2, chunk.len()))
            );
            let mut stmt = self.conn.prepare(&sql).map_err(data_access(op))?;
            let params = std::iter::once(object_type.to_string()).chain(chunk.iter().cloned());
            let raw = stmt
                .query_map(params_from_iter(params), |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))
                .map_err(data_access(op))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(data_access(op))?;
            for (seq, fields_json) in raw {
                let record = parse_record(object_type, &fields_json, self.schema.as_ref())
                    .map_err(|e| RollupError::data_access(op, format!("invalid stored record: {}", e)))?;
                rows.push((seq, record));
            }
        }
        rows.sort_by_key(|(seq, _)| *seq);
        rows.dedup_by_key(|(seq, _)| *seq);
        Ok(rows.into_iter().map(|(_, r)| r).collect())
    }

    /// Insert or replace one record
    pub fn upsert_record(&mut self, record: &Record) -> Result<()> {
        write_record(&self.conn, record).map_err(from_rusqlite)
    }

    /// Insert or replace many records in one transaction
    pub fn upsert_records(&mut self, records: &[Record]) -> Result<usize> {
        let tx = self.conn.transaction().map_err(from_rusqlite)?;
        for record in records {
            write_record(&tx, record).map_err(from_rusqlite)?;
        }
        tx.commit().map_err(from_rusqlite)?;
        Ok(records.len())
    }

    /// Import a JSON array of flat objects as records of `object_type`
    ///
    /// Values are coerced to the schema's field types when the type is known.
    pub fn import_records_json(&mut self, object_type: &str, json: &str, schema: &SchemaRegistry) -> Result<usize> {
        let objects: Vec<serde_json::Map<String, serde_json::Value>> =
            serde_json::from_str(json).map_err(|e| corrupt_row("import_records", e))?;
        let object_schema = schema.get(object_type);
        let records = objects
            .into_iter()
            .map(|o| {
                let record = Record::from_json(object_type, o)?;
                Ok(match object_schema {
                    Some(s) => record.coerce_with(s),
                    None => record,
                })
            })
            .collect::<rollup_core::errors::Result<Vec<Record>>>()?;
        self.upsert_records(&records)
    }

    pub fn get_record(&self, object_type: &str, id: &str) -> Result<Option<Record>> {
        read_record(&self.conn, object_type, id)
            .map_err(from_rusqlite)?
            .map(|json| parse_record(object_type, &json, self.schema.as_ref()).map_err(|e| corrupt_row("get_record", e)))
            .transpose()
    }

    pub fn delete_record(&mut self, object_type: &str, id: &str) -> Result<bool> {
        let n = self
            .conn
            .execute(
                "DELETE FROM records WHERE object_type = ?1 AND id = ?2",
                [object_type, id],
            )
            .map_err(from_rusqlite)?;
        Ok(n > 0)
    }

    /// Record counts per object type
    pub fn record_counts(&self) -> Result<BTreeMap<String, usize>> {
        let mut stmt = self
            .conn
            .prepare("SELECT object_type, COUNT(*) FROM records GROUP BY object_type")
            .map_err(from_rusqlite)?;
        let counts = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;
        Ok(counts.into_iter().map(|(t, n)| (t, n as usize)).collect())
    }
}

/// Apply one update inside the caller's savepoint; the error is the
/// per-record failure message
fn apply_update(
    conn: &Connection,
    schema: Option<&SchemaRegistry>,
    object_type: &str,
    update: &ParentUpdate,
) -> std::result::Result<(), String> {
    let json = read_record(conn, object_type, &update.parent_id)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "parent record not found".to_string())?;
    let mut record = parse_record(object_type, &json, schema)?;

    let conflicts = update.conflicts(&record);
    if !conflicts.is_empty() {
        return Err(format!("concurrent modification of {}", conflicts.join(", ")));
    }
    for (field, value) in &update.fields {
        record.set(field.clone(), value.clone());
    }
    write_record(conn, &record).map_err(|e| e.to_string())
}

impl RecordSource for SqliteHost {
    fn fetch_all(&self, object_type: &str) -> CoreResult<Vec<Record>> {
        self.query_records("fetch_all", object_type, "", &[])
    }

    fn fetch_by_ids(&self, object_type: &str, ids: &[String]) -> CoreResult<Vec<Record>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.query_records("fetch_by_ids", object_type, "AND id IN ({in})", ids)
    }

    /// Values compare as text against the stored JSON value
    fn fetch_by_field(&self, object_type: &str, field: &str, values: &[String]) -> CoreResult<Vec<Record>> {
        if values.is_empty() {
            return Ok(Vec::new());
        }
        let path = format!("$.\"{}\"", field.replace('"', ""));
        let clause = format!(
            "AND CAST(json_extract(fields_json, '{}') AS TEXT) IN ({{in}})",
            path.replace('\'', "")
        );
        self.query_records("fetch_by_field", object_type, &clause, values)
    }

    fn count(&self, object_type: &str) -> CoreResult<usize> {
        let n: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM records WHERE object_type = ?1",
                [object_type],
                |row| row.get(0),
            )
            .map_err(data_access("count"))?;
        Ok(n as usize)
    }

    fn list_ids(&self, object_type: &str) -> CoreResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id FROM records WHERE object_type = ?1 ORDER BY seq")
            .map_err(data_access("list_ids"))?;
        let ids = stmt
            .query_map([object_type], |row| row.get(0))
            .map_err(data_access("list_ids"))?
            .collect::<std::result::Result<Vec<String>, _>>()
            .map_err(data_access("list_ids"))?;
        Ok(ids)
    }
}

impl RecordSink for SqliteHost {
    /// One transaction per call; each update runs in its own savepoint so a
    /// failing row rolls back alone
    fn update_records(&mut self, object_type: &str, updates: &[ParentUpdate]) -> CoreResult<Vec<WriteOutcome>> {
        let op = "update_records";
        let schema = self.schema.as_ref();
        let mut tx = self.conn.transaction().map_err(data_access(op))?;
        let mut outcomes = Vec::with_capacity(updates.len());
        for update in updates {
            let sp = tx.savepoint().map_err(data_access(op))?;
            match apply_update(&sp, schema, object_type, update) {
                Ok(()) => {
                    sp.commit().map_err(data_access(op))?;
                    outcomes.push(WriteOutcome::ok(&update.parent_id));
                }
                Err(message) => {
                    tracing::debug!(object_type, parent_id = %update.parent_id, %message, "parent update rejected");
                    drop(sp);
                    outcomes.push(WriteOutcome::failed(&update.parent_id, message));
                }
            }
        }
        tx.commit().map_err(data_access(op))?;
        Ok(outcomes)
    }
}
