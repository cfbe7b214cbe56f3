//! Job ledger and chunk queue

use chrono::{DateTime, Utc};
use rollup_core::errors::RollupError;
use rollup_core::host::{JobQueue, JobTracker};
use rollup_core::jobs::{ChunkRecord, ChunkTask, JobId, JobRecord, JobStatus};
use rusqlite::{Connection, OptionalExtension, Row};

use crate::errors::{data_access, data_corrupt, from_rusqlite, Result};
use crate::host::SqliteHost;

type CoreResult<T> = rollup_core::errors::Result<T>;

fn corrupt(op: &str, what: impl std::fmt::Display) -> RollupError {
    RollupError::data_access(op, format!("invalid stored value: {}", what))
}

fn parse_job_id(op: &str, s: &str) -> CoreResult<JobId> {
    JobId::parse(s).ok_or_else(|| corrupt(op, format!("job id '{}'", s)))
}

fn parse_status(op: &str, s: &str) -> CoreResult<JobStatus> {
    s.parse().map_err(|bad| corrupt(op, format!("job status '{}'", bad)))
}

fn parse_time(op: &str, s: &str) -> CoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| corrupt(op, e))
}

fn ids_json(ids: &[String]) -> CoreResult<String> {
    serde_json::to_string(ids).map_err(RollupError::from)
}

/// Columns of a `jobs` row before parsing
struct JobRow {
    job_id: String,
    status: String,
    invocation: Option<String>,
    total_chunks: u32,
    message: Option<String>,
    failed_ids_json: String,
    created_at: String,
    updated_at: String,
}

impl JobRow {
    const COLUMNS: &'static str =
        "job_id, status, invocation, total_chunks, message, failed_ids_json, created_at, updated_at";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            job_id: row.get(0)?,
            status: row.get(1)?,
            invocation: row.get(2)?,
            total_chunks: row.get(3)?,
            message: row.get(4)?,
            failed_ids_json: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_record(self, op: &str) -> CoreResult<JobRecord> {
        Ok(JobRecord {
            job_id: parse_job_id(op, &self.job_id)?,
            status: parse_status(op, &self.status)?,
            created_at: parse_time(op, &self.created_at)?,
            updated_at: parse_time(op, &self.updated_at)?,
            invocation: self.invocation,
            total_chunks: self.total_chunks,
            message: self.message,
            failed_ids: serde_json::from_str(&self.failed_ids_json).map_err(data_corrupt(op))?,
        })
    }
}

/// Columns of a `job_chunks` row before parsing
struct ChunkRow {
    job_id: String,
    index: u32,
    status: String,
    definition_key: String,
    definition_json: String,
    parent_ids_json: String,
    message: Option<String>,
    failed_ids_json: String,
    updated_at: String,
}

impl ChunkRow {
    const COLUMNS: &'static str =
        "job_id, chunk_index, status, definition_key, definition_json, parent_ids_json, message, failed_ids_json, updated_at";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            job_id: row.get(0)?,
            index: row.get(1)?,
            status: row.get(2)?,
            definition_key: row.get(3)?,
            definition_json: row.get(4)?,
            parent_ids_json: row.get(5)?,
            message: row.get(6)?,
            failed_ids_json: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_record(self, op: &str) -> CoreResult<ChunkRecord> {
        Ok(ChunkRecord {
            job_id: parse_job_id(op, &self.job_id)?,
            index: self.index,
            status: parse_status(op, &self.status)?,
            definition_key: self.definition_key,
            definition: serde_json::from_str(&self.definition_json).map_err(data_corrupt(op))?,
            parent_ids: serde_json::from_str(&self.parent_ids_json).map_err(data_corrupt(op))?,
            message: self.message,
            failed_ids: serde_json::from_str(&self.failed_ids_json).map_err(data_corrupt(op))?,
            updated_at: parse_time(op, &self.updated_at)?,
        })
    }
}

fn write_job(conn: &Connection, op: &str, job: &JobRecord, insert: bool) -> CoreResult<usize> {
    let sql = if insert {
        "INSERT INTO jobs (job_id, status, invocation, total_chunks, message, failed_ids_json, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
    } else {
        "UPDATE jobs SET status = ?2, invocation = ?3, total_chunks = ?4, message = ?5,
            failed_ids_json = ?6, created_at = ?7, updated_at = ?8
         WHERE job_id = ?1"
    };
    conn.execute(
        sql,
        rusqlite::params![
            job.job_id.as_str(),
            job.status.as_str(),
            job.invocation,
            job.total_chunks,
            job.message,
            ids_json(&job.failed_ids)?,
            job.created_at.to_rfc3339(),
            job.updated_at.to_rfc3339(),
        ],
    )
    .map_err(data_access(op))
}

fn write_chunk(conn: &Connection, op: &str, chunk: &ChunkRecord, insert: bool) -> CoreResult<usize> {
    let sql = if insert {
        "INSERT INTO job_chunks
            (job_id, chunk_index, status, definition_key, definition_json, parent_ids_json, message, failed_ids_json, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
    } else {
        "UPDATE job_chunks SET status = ?3, definition_key = ?4, definition_json = ?5, parent_ids_json = ?6,
            message = ?7, failed_ids_json = ?8, updated_at = ?9
         WHERE job_id = ?1 AND chunk_index = ?2"
    };
    let definition_json = serde_json::to_string(&chunk.definition).map_err(RollupError::from)?;
    conn.execute(
        sql,
        rusqlite::params![
            chunk.job_id.as_str(),
            chunk.index,
            chunk.status.as_str(),
            chunk.definition_key,
            definition_json,
            ids_json(&chunk.parent_ids)?,
            chunk.message,
            ids_json(&chunk.failed_ids)?,
            chunk.updated_at.to_rfc3339(),
        ],
    )
    .map_err(data_access(op))
}

impl SqliteHost {
    /// Most recently created jobs first
    pub fn recent_jobs(&self, limit: usize) -> Result<Vec<JobRecord>> {
        let op = "recent_jobs";
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM jobs ORDER BY created_at DESC, job_id DESC LIMIT ?1",
                JobRow::COLUMNS
            ))
            .map_err(from_rusqlite)?;
        let rows = stmt
            .query_map([limit as i64], JobRow::from_row)
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;
        Ok(rows
            .into_iter()
            .map(|r| r.into_record(op))
            .collect::<CoreResult<Vec<_>>>()?)
    }

    pub fn queue_len(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunk_queue", [], |row| row.get(0))
            .map_err(from_rusqlite)?;
        Ok(n as usize)
    }
}

impl JobTracker for SqliteHost {
    fn create_job(&mut self, job: &JobRecord) -> CoreResult<()> {
        write_job(&self.conn, "create_job", job, true).map(|_| ())
    }

    fn update_job(&mut self, job: &JobRecord) -> CoreResult<()> {
        match write_job(&self.conn, "update_job", job, false)? {
            0 => Err(RollupError::JobNotFound {
                job_id: job.job_id.to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn get_job(&self, job_id: &JobId) -> CoreResult<Option<JobRecord>> {
        let op = "get_job";
        self.conn
            .query_row(
                &format!("SELECT {} FROM jobs WHERE job_id = ?1", JobRow::COLUMNS),
                [job_id.as_str()],
                JobRow::from_row,
            )
            .optional()
            .map_err(data_access(op))?
            .map(|r| r.into_record(op))
            .transpose()
    }

    fn record_chunk(&mut self, chunk: &ChunkRecord) -> CoreResult<()> {
        write_chunk(&self.conn, "record_chunk", chunk, true).map(|_| ())
    }

    fn update_chunk(&mut self, chunk: &ChunkRecord) -> CoreResult<()> {
        match write_chunk(&self.conn, "update_chunk", chunk, false)? {
            0 => Err(RollupError::ChunkNotFound {
                job_id: chunk.job_id.to_string(),
                index: chunk.index,
            }),
            _ => Ok(()),
        }
    }

    fn get_chunk(&self, job_id: &JobId, index: u32) -> CoreResult<Option<ChunkRecord>> {
        let op = "get_chunk";
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM job_chunks WHERE job_id = ?1 AND chunk_index = ?2",
                    ChunkRow::COLUMNS
                ),
                rusqlite::params![job_id.as_str(), index],
                ChunkRow::from_row,
            )
            .optional()
            .map_err(data_access(op))?
            .map(|r| r.into_record(op))
            .transpose()
    }

    fn list_chunks(&self, job_id: &JobId) -> CoreResult<Vec<ChunkRecord>> {
        let op = "list_chunks";
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM job_chunks WHERE job_id = ?1 ORDER BY chunk_index",
                ChunkRow::COLUMNS
            ))
            .map_err(data_access(op))?;
        let rows = stmt
            .query_map([job_id.as_str()], ChunkRow::from_row)
            .map_err(data_access(op))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(data_access(op))?;
        rows.into_iter().map(|r| r.into_record(op)).collect()
    }
}

impl JobQueue for SqliteHost {
    fn enqueue(&mut self, task: &ChunkTask) -> CoreResult<()> {
        let task_json = serde_json::to_string(task).map_err(RollupError::from)?;
        self.conn
            .execute(
                "INSERT INTO chunk_queue (job_id, chunk_index, task_json, enqueued_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![task.job_id.as_str(), task.index, task_json, Utc::now().timestamp()],
            )
            .map_err(|e| RollupError::DispatchFailed {
                reason: e.to_string(),
            })?;
        Ok(())
    }

    /// Pop the oldest task; the row is removed in the same transaction
    fn dequeue(&mut self) -> CoreResult<Option<ChunkTask>> {
        let op = "dequeue";
        let tx = self.conn.transaction().map_err(data_access(op))?;
        let next: Option<(i64, String)> = tx
            .query_row(
                "SELECT seq, task_json FROM chunk_queue ORDER BY seq LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(data_access(op))?;
        let Some((seq, task_json)) = next else {
            return Ok(None);
        };
        tx.execute("DELETE FROM chunk_queue WHERE seq = ?1", [seq])
            .map_err(data_access(op))?;
        tx.commit().map_err(data_access(op))?;
        serde_json::from_str(&task_json).map(Some).map_err(data_corrupt(op))
    }
}
