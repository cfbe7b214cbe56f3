//! Job and chunk state model
//!
//! An asynchronous run is one job split into chunks. Each chunk covers one
//! definition and a bounded set of parent ids, so a rollup group is never
//! split across chunks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{Result, RollupError};
use crate::model::RollupDefinition;

const JOB_PREFIX: &str = "job-";

/// Text of the sentinel handle returned when no job was created
pub const NO_PROCESS_ID: &str = "No process Id";

/// Job identifier: `job-` followed by a UUIDv7
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new() -> Self {
        Self(format!("{}{}", JOB_PREFIX, Uuid::now_v7()))
    }

    /// Accepts only well-formed job ids
    pub fn parse(s: &str) -> Option<Self> {
        let rest = s.trim().strip_prefix(JOB_PREFIX)?;
        Uuid::parse_str(rest).ok()?;
        Some(Self(s.trim().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle returned to callers of bulk operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobHandle {
    Job(JobId),
    /// No asynchronous work was created
    NoProcessId,
}

impl JobHandle {
    pub fn parse(s: &str) -> Option<Self> {
        if s.trim().eq_ignore_ascii_case(NO_PROCESS_ID) {
            return Some(JobHandle::NoProcessId);
        }
        JobId::parse(s).map(JobHandle::Job)
    }

    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            JobHandle::Job(id) => Some(id),
            JobHandle::NoProcessId => None,
        }
    }
}

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobHandle::Job(id) => write!(f, "{}", id),
            JobHandle::NoProcessId => f.write_str(NO_PROCESS_ID),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Aborted,
    /// Sentinel: the run finished inline and no job exists
    NotRequired,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "Queued",
            JobStatus::Processing => "Processing",
            JobStatus::Completed => "Completed",
            JobStatus::Failed => "Failed",
            JobStatus::Aborted => "Aborted",
            JobStatus::NotRequired => "NotRequired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Aborted | JobStatus::NotRequired
        )
    }

    /// Allowed chunk transitions; Failed may go back to Queued on retry
    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        matches!(
            (self, to),
            (JobStatus::Queued, JobStatus::Processing)
                | (JobStatus::Queued, JobStatus::Aborted)
                | (JobStatus::Queued, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Aborted)
                | (JobStatus::Failed, JobStatus::Queued)
        )
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Aborted,
            JobStatus::NotRequired,
        ]
        .into_iter()
        .find(|st| st.as_str().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| s.to_string())
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job status derived from its chunks, worst state wins
///
/// Any Failed chunk fails the job, then any Aborted chunk aborts it.
/// Completed requires every chunk Completed; all Queued stays Queued;
/// anything else is Processing.
pub fn aggregate_status(chunks: &[JobStatus]) -> JobStatus {
    if chunks.is_empty() {
        return JobStatus::Queued;
    }
    if chunks.contains(&JobStatus::Failed) {
        JobStatus::Failed
    } else if chunks.contains(&JobStatus::Aborted) {
        JobStatus::Aborted
    } else if chunks.iter().all(|s| *s == JobStatus::Completed) {
        JobStatus::Completed
    } else if chunks.iter().all(|s| *s == JobStatus::Queued) {
        JobStatus::Queued
    } else {
        JobStatus::Processing
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub invocation: Option<String>,
    pub total_chunks: u32,
    pub message: Option<String>,
    pub failed_ids: Vec<String>,
}

impl JobRecord {
    pub fn new(job_id: JobId, total_chunks: u32, invocation: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            status: JobStatus::Queued,
            created_at: now,
            updated_at: now,
            invocation,
            total_chunks,
            message: None,
            failed_ids: Vec::new(),
        }
    }

    /// Recompute status, message and failed ids from the chunk records
    pub fn refresh(&mut self, chunks: &[ChunkRecord]) {
        let statuses: Vec<JobStatus> = chunks.iter().map(|c| c.status).collect();
        self.status = aggregate_status(&statuses);
        self.failed_ids = chunks
            .iter()
            .flat_map(|c| c.failed_ids.iter().cloned())
            .collect();
        let messages: Vec<String> = chunks
            .iter()
            .filter_map(|c| c.message.as_ref().map(|m| format!("chunk {}: {}", c.index, m)))
            .collect();
        self.message = (!messages.is_empty()).then(|| messages.join("; "));
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub job_id: JobId,
    pub index: u32,
    pub status: JobStatus,
    pub definition_key: String,
    /// Kept so a failed chunk can be queued again
    pub definition: RollupDefinition,
    pub parent_ids: Vec<String>,
    pub message: Option<String>,
    pub failed_ids: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl ChunkRecord {
    pub fn queued(task: &ChunkTask) -> Self {
        Self {
            job_id: task.job_id.clone(),
            index: task.index,
            status: JobStatus::Queued,
            definition_key: task.definition.key(),
            definition: task.definition.clone(),
            parent_ids: task.parent_ids.clone(),
            message: None,
            failed_ids: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// The task that re-runs this chunk
    pub fn task(&self) -> ChunkTask {
        ChunkTask {
            job_id: self.job_id.clone(),
            index: self.index,
            definition: self.definition.clone(),
            parent_ids: self.parent_ids.clone(),
        }
    }

    /// Move to `to`, enforcing the chunk state machine
    ///
    /// # Errors
    ///
    /// Returns `RollupError::InvalidTransition` for disallowed moves.
    pub fn transition(&mut self, to: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(RollupError::InvalidTransition {
                job_id: self.job_id.to_string(),
                index: self.index,
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        if to == JobStatus::Queued {
            self.message = None;
            self.failed_ids.clear();
        }
        Ok(())
    }
}

/// Unit of asynchronous work: one definition over a bounded parent set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkTask {
    pub job_id: JobId,
    pub index: u32,
    pub definition: RollupDefinition,
    pub parent_ids: Vec<String>,
}
