//! Job tracker operations
//!
//! Chunk execution is where runtime failures stop being errors: a chunk
//! that cannot read or write is marked Failed with the message and the
//! affected parent ids, and the job status is recomputed from its chunks.

use rollup_core::errors::{Result as CoreResult, RollupError};
use rollup_core::guard::UnitOfWork;
use rollup_core::jobs::{ChunkRecord, ChunkTask, JobHandle, JobId, JobRecord, JobStatus};
use rollup_core::pipeline::{self, ParentSelection, RunReport};
use rollup_core::RollupHost;
use rollup_core_types::RequestContext;
use rollup_store::errors::Result;
use serde::Serialize;

use crate::engine::{observe, RollupEngine};

/// What a status read reports for a handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStatusReport {
    pub handle: String,
    /// Absent when the handle does not name a job
    pub status: Option<JobStatus>,
    /// Status name, or the handle itself when it does not name a job
    pub status_text: String,
    pub total_chunks: u32,
    pub message: Option<String>,
    pub failed_ids: Vec<String>,
}

impl JobStatusReport {
    fn verbatim(handle: &str) -> Self {
        Self {
            handle: handle.to_string(),
            status: None,
            status_text: handle.to_string(),
            total_chunks: 0,
            message: None,
            failed_ids: Vec::new(),
        }
    }

    fn from_job(handle: &str, job: &JobRecord) -> Self {
        Self {
            handle: handle.to_string(),
            status: Some(job.status),
            status_text: job.status.to_string(),
            total_chunks: job.total_chunks,
            message: job.message.clone(),
            failed_ids: job.failed_ids.clone(),
        }
    }

    /// Whether polling can stop; a handle that names no job never changes
    pub fn is_terminal(&self) -> bool {
        self.status.map_or(true, |s| s.is_terminal())
    }
}

impl<'a, H: RollupHost> RollupEngine<'a, H> {
    /// Idempotent status read
    ///
    /// Handles that are not job ids (including "No process Id") are echoed
    /// back as their own status text.
    ///
    /// # Errors
    ///
    /// `NotFound` for a well-formed job id with no job record.
    pub fn get_job_status(&self, handle: &str) -> Result<JobStatusReport> {
        let ctx = RequestContext::new();
        observe("get_job_status", &ctx, || {
            let job_id = match JobHandle::parse(handle) {
                Some(JobHandle::Job(id)) => id,
                _ => return Ok(JobStatusReport::verbatim(handle)),
            };
            let job = self.host.get_job(&job_id)?.ok_or_else(|| RollupError::JobNotFound {
                job_id: job_id.to_string(),
            })?;
            Ok(JobStatusReport::from_job(handle, &job))
        })
    }

    /// Status text only, as a polling widget shows it
    ///
    /// # Errors
    ///
    /// See [`Self::get_job_status`].
    pub fn get_job_status_text(&self, handle: &str) -> Result<String> {
        self.get_job_status(handle).map(|r| r.status_text)
    }

    /// Run one queued chunk and record its outcome
    ///
    /// A chunk that is no longer Queued (aborted, or already run) is left
    /// untouched and returned as is.
    ///
    /// # Errors
    ///
    /// Only job ledger failures. Evaluation and write failures end up in
    /// the returned chunk record.
    pub fn execute_chunk(&mut self, task: &ChunkTask) -> Result<ChunkRecord> {
        let ctx = RequestContext::new();
        observe("execute_chunk", &ctx, || self.run_chunk(task, &ctx))
    }

    /// Drain the host queue, running at most `max` chunks
    ///
    /// # Errors
    ///
    /// Queue or job ledger failures.
    pub fn run_pending(&mut self, max: Option<usize>) -> Result<usize> {
        let ctx = RequestContext::new();
        observe("run_pending", &ctx, || {
            let mut ran = 0;
            while max.map_or(true, |m| ran < m) {
                let Some(task) = self.host.dequeue()? else {
                    break;
                };
                self.run_chunk(&task, &ctx)?;
                ran += 1;
            }
            Ok(ran)
        })
    }

    /// Abort a chunk; the job surfaces as Aborted unless another chunk failed
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown chunk, `InvalidTransition` when the chunk
    /// already reached a terminal state.
    pub fn abort_chunk(&mut self, job_id: &JobId, index: u32) -> Result<ChunkRecord> {
        let ctx = RequestContext::new();
        observe("abort_chunk", &ctx, || {
            let mut chunk = self.chunk(job_id, index)?;
            chunk.transition(JobStatus::Aborted)?;
            self.host.update_chunk(&chunk)?;
            self.refresh_job(job_id)?;
            Ok(chunk)
        })
    }

    /// Put every Failed chunk of a job back on the queue
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown job; queue failures.
    pub fn retry_failed_chunks(&mut self, job_id: &JobId) -> Result<usize> {
        let ctx = RequestContext::new();
        observe("retry_failed_chunks", &ctx, || {
            if self.host.get_job(job_id)?.is_none() {
                return Err(RollupError::JobNotFound {
                    job_id: job_id.to_string(),
                }
                .into());
            }
            let mut requeued = 0;
            for mut chunk in self.host.list_chunks(job_id)? {
                if chunk.status != JobStatus::Failed {
                    continue;
                }
                chunk.transition(JobStatus::Queued)?;
                self.host.update_chunk(&chunk)?;
                self.host.enqueue(&chunk.task())?;
                requeued += 1;
            }
            let job = self.refresh_job(job_id)?;
            tracing::info!(job_id = %job_id, requeued, status = %job.status, "failed chunks requeued");
            Ok(requeued)
        })
    }

    /// Recompute a job's status from its chunks and store it
    pub(crate) fn refresh_job(&mut self, job_id: &JobId) -> Result<JobRecord> {
        let mut job = self.host.get_job(job_id)?.ok_or_else(|| RollupError::JobNotFound {
            job_id: job_id.to_string(),
        })?;
        let chunks = self.host.list_chunks(job_id)?;
        job.refresh(&chunks);
        self.host.update_job(&job)?;
        Ok(job)
    }

    fn chunk(&self, job_id: &JobId, index: u32) -> Result<ChunkRecord> {
        Ok(self
            .host
            .get_chunk(job_id, index)?
            .ok_or_else(|| RollupError::ChunkNotFound {
                job_id: job_id.to_string(),
                index,
            })?)
    }

    fn run_chunk(&mut self, task: &ChunkTask, ctx: &RequestContext) -> Result<ChunkRecord> {
        let mut chunk = self.chunk(&task.job_id, task.index)?;
        if chunk.status != JobStatus::Queued {
            tracing::debug!(
                job_id = %task.job_id,
                chunk = task.index,
                status = %chunk.status,
                "chunk is not queued, skipping"
            );
            return Ok(chunk);
        }

        chunk.transition(JobStatus::Processing)?;
        self.host.update_chunk(&chunk)?;
        self.refresh_job(&task.job_id)?;

        match self.evaluate_task(task, ctx) {
            Ok(report) => match report.write.partial_failure() {
                None => chunk.transition(JobStatus::Completed)?,
                Some(err) => {
                    chunk.transition(JobStatus::Failed)?;
                    chunk.message = Some(err.to_string());
                    chunk.failed_ids = report.write.failed_ids();
                }
            },
            Err(err) => {
                chunk.transition(JobStatus::Failed)?;
                chunk.message = Some(err.to_string());
                chunk.failed_ids = task.parent_ids.clone();
            }
        }
        self.host.update_chunk(&chunk)?;
        let job = self.refresh_job(&task.job_id)?;

        tracing::debug!(
            job_id = %task.job_id,
            chunk = task.index,
            chunk_status = %chunk.status,
            job_status = %job.status,
            "chunk finished"
        );
        Ok(chunk)
    }

    fn evaluate_task(&mut self, task: &ChunkTask, ctx: &RequestContext) -> CoreResult<RunReport> {
        let def = self.resolver().resolve(&task.definition)?;
        let mut uow = UnitOfWork::new(ctx.clone());
        pipeline::run_definitions(
            &mut *self.host,
            std::slice::from_ref(&def),
            &ParentSelection::Ids(task.parent_ids.clone()),
            &mut uow,
            self.config.write_batch_size,
        )
    }
}
