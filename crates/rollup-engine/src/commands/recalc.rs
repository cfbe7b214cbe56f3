//! Recalculation operations
//!
//! Bulk runs touching at most `sync_threshold` calculation items execute
//! inline and return the "No process Id" handle. Larger runs are split into
//! chunks of at most `chunk_size` parent ids per definition, recorded in the
//! job ledger and handed to the host queue.

use rollup_core::evaluator::RollupValue;
use rollup_core::guard::UnitOfWork;
use rollup_core::host::DefinitionSource;
use rollup_core::jobs::{ChunkRecord, ChunkTask, JobHandle, JobId, JobRecord, JobStatus};
use rollup_core::metadata::ResolvedDefinition;
use rollup_core::pipeline::{self, ParentSelection, RunReport};
use rollup_core::planner::{affected_parent_keys, ItemChange, RelatedRecordCache};
use rollup_core::writer::ParentWriter;
use rollup_core::{ExError, ExErrorKind, Record, RollupDefinition, RollupHost};
use rollup_core_types::RequestContext;
use rollup_store::errors::Result;
use serde::{Deserialize, Serialize};

use crate::engine::{observe, request_context, RollupEngine};

/// Outcome of dispatching a bulk run
#[derive(Debug, Clone, PartialEq)]
pub struct JobTicket {
    pub handle: JobHandle,
    /// `NotRequired` for a clean inline run, `Queued` once chunks are
    /// dispatched, `Failed` when inline writes or dispatch failed
    pub status: JobStatus,
    pub total_chunks: u32,
    pub message: Option<String>,
    pub failed_ids: Vec<String>,
    /// Present when the run finished inline
    pub report: Option<RunReport>,
}

impl JobTicket {
    fn inline(report: RunReport) -> Self {
        let (status, message) = match report.write.partial_failure() {
            Some(err) => (JobStatus::Failed, Some(err.to_string())),
            None => (JobStatus::NotRequired, None),
        };
        Self {
            handle: JobHandle::NoProcessId,
            status,
            total_chunks: 0,
            message,
            failed_ids: report.write.failed_ids(),
            report: Some(report),
        }
    }

    /// Handle text to hand back to a caller for polling
    pub fn handle_text(&self) -> String {
        self.handle.to_string()
    }
}

/// A record whose rollups should be recalculated
///
/// With `via_field` set, the record is not the parent itself: the value of
/// that lookup field names the parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentRef {
    pub object_type: String,
    pub record_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via_field: Option<String>,
}

impl ParentRef {
    pub fn new(object_type: impl Into<String>, record_id: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            record_id: record_id.into(),
            via_field: None,
        }
    }

    pub fn via(mut self, lookup_field: impl Into<String>) -> Self {
        self.via_field = Some(lookup_field.into());
        self
    }
}

impl<'a, H: RollupHost> RollupEngine<'a, H> {
    /// Aggregate `items` with one definition without writing anything
    ///
    /// # Errors
    ///
    /// Validation errors for the definition, or a read failure while
    /// resolving relationship fields of the items.
    pub fn recalculate_single(&self, definition: &RollupDefinition, items: &[Record]) -> Result<RollupValue> {
        let ctx = RequestContext::new();
        observe("recalculate_single", &ctx, || {
            let resolved = self.resolver().resolve(definition)?;
            Ok(pipeline::preview(&*self.host, &resolved, items)?)
        })
    }

    /// Recalculate every parent of each active definition
    ///
    /// # Errors
    ///
    /// Validation errors are returned before any data is read. Failing to
    /// enqueue a chunk is not an error: the ticket reports `Failed` with the
    /// "No process Id" handle.
    pub fn recalculate_bulk(&mut self, definitions: &[RollupDefinition], invocation: Option<&str>) -> Result<JobTicket> {
        let ctx = request_context(invocation);
        observe("recalculate_bulk", &ctx, || self.dispatch(definitions, &ctx))
    }

    /// Same as [`Self::recalculate_bulk`] for a string-encoded payload
    ///
    /// Order-by children that were not loaded are fetched from the host's
    /// definition source.
    ///
    /// # Errors
    ///
    /// Malformed payloads and invalid definitions.
    pub fn recalculate_from_config_payload(&mut self, payload: &str, invocation: &str) -> Result<JobTicket> {
        let ctx = request_context(Some(invocation));
        observe("recalculate_from_config_payload", &ctx, || {
            let source: &dyn DefinitionSource = &*self.host;
            let definitions = self.resolver().normalize_payload(payload, Some(source))?;
            self.dispatch(&definitions, &ctx)
        })
    }

    /// Run every stored active definition whose parent type matches the
    /// target, for that one parent
    ///
    /// # Errors
    ///
    /// `NotFound` when the record behind a `via_field` lookup is missing,
    /// `InvalidInput` when `via_field` is not a to-one lookup, plus the
    /// usual validation and read errors. Write failures are in the report.
    pub fn recalculate_parent(&mut self, target: &ParentRef, invocation: Option<&str>) -> Result<RunReport> {
        let ctx = request_context(invocation);
        observe("recalculate_parent", &ctx, || {
            let Some((parent_type, parent_id)) = self.locate_parent(target)? else {
                tracing::debug!(
                    object_type = %target.object_type,
                    record_id = %target.record_id,
                    "lookup is empty, nothing to recalculate"
                );
                return Ok(RunReport::default());
            };
            let definitions: Vec<RollupDefinition> = self
                .stored_definitions()?
                .into_iter()
                .filter(|d| d.active && d.parent_type.eq_ignore_ascii_case(&parent_type))
                .collect();
            let resolved = self.resolver().resolve_all(&definitions)?;
            let mut uow = UnitOfWork::new(ctx.clone());
            Ok(pipeline::run_definitions(
                &mut *self.host,
                &resolved,
                &ParentSelection::Ids(vec![parent_id]),
                &mut uow,
                self.config.write_batch_size,
            )?)
        })
    }

    /// Re-aggregate the parents affected by a set of item changes
    ///
    /// With `definitions` absent the host's stored definitions are used.
    /// Pairs already claimed in `uow` are skipped, so a cascade that
    /// re-enters with the same unit of work does no further writes.
    ///
    /// # Errors
    ///
    /// Validation and read errors. Write failures are in the report.
    pub fn process_changes(
        &mut self,
        uow: &mut UnitOfWork,
        definitions: Option<&[RollupDefinition]>,
        changes: &[ItemChange],
    ) -> Result<RunReport> {
        let ctx = uow.context().clone();
        observe("process_changes", &ctx, || {
            let candidates = match definitions {
                Some(defs) => defs.to_vec(),
                None => self.stored_definitions()?,
            };
            let touched = |d: &RollupDefinition| {
                changes
                    .iter()
                    .any(|c| c.object_type().is_some_and(|t| t.eq_ignore_ascii_case(&d.calc_item_type)))
            };
            let relevant: Vec<RollupDefinition> = candidates.into_iter().filter(|d| d.active && touched(d)).collect();
            let resolved = self.resolver().resolve_all(&relevant)?;

            let versions: Vec<Record> = changes
                .iter()
                .flat_map(|c| c.old.iter().chain(c.new.iter()))
                .cloned()
                .collect();
            let mut writer = ParentWriter::new(self.config.write_batch_size);
            let mut report = RunReport::default();
            for def in &resolved {
                let mut cache = RelatedRecordCache::new();
                cache.hydrate(&*self.host, &versions, &def.item_fields())?;
                let keys: Vec<String> = affected_parent_keys(def, changes, &cache).into_iter().collect();
                tracing::debug!(
                    definition = %def.definition.display_name(),
                    affected = keys.len(),
                    "affected parents derived"
                );
                let selection = ParentSelection::Keys(keys);
                report.merge(pipeline::stage_definition(&*self.host, def, &selection, uow, &mut writer)?);
            }
            report.write = writer.flush(&mut *self.host);
            Ok(report)
        })
    }

    fn dispatch(&mut self, definitions: &[RollupDefinition], ctx: &RequestContext) -> Result<JobTicket> {
        let active: Vec<RollupDefinition> = definitions.iter().filter(|d| d.active).cloned().collect();
        let resolved = self.resolver().resolve_all(&active)?;

        let mut items = 0;
        for def in &resolved {
            items += self.host.count(def.calc_item_type())?;
        }
        tracing::debug!(
            definitions = resolved.len(),
            items,
            threshold = self.config.sync_threshold,
            "bulk run sized"
        );

        if items <= self.config.sync_threshold {
            let mut uow = UnitOfWork::new(ctx.clone());
            let report = pipeline::run_definitions(
                &mut *self.host,
                &resolved,
                &ParentSelection::All,
                &mut uow,
                self.config.write_batch_size,
            )?;
            return Ok(JobTicket::inline(report));
        }
        self.enqueue_chunks(&resolved, ctx)
    }

    fn enqueue_chunks(&mut self, resolved: &[ResolvedDefinition], ctx: &RequestContext) -> Result<JobTicket> {
        let job_id = JobId::new();
        let chunk_size = self.config.chunk_size.max(1);
        let mut tasks: Vec<ChunkTask> = Vec::new();
        for def in resolved {
            let parent_ids = self.host.list_ids(def.parent_type())?;
            for slice in parent_ids.chunks(chunk_size) {
                tasks.push(ChunkTask {
                    job_id: job_id.clone(),
                    index: tasks.len() as u32,
                    definition: def.definition.clone(),
                    parent_ids: slice.to_vec(),
                });
            }
        }
        if tasks.is_empty() {
            return Ok(JobTicket::inline(RunReport {
                definitions: resolved.len(),
                ..RunReport::default()
            }));
        }

        let total_chunks = tasks.len() as u32;
        let job = JobRecord::new(job_id.clone(), total_chunks, ctx.invocation.clone());
        if let Err(err) = self.record_job(&job, &tasks) {
            return Ok(self.abandon(&job_id, &[], &tasks, err));
        }
        for (pos, task) in tasks.iter().enumerate() {
            if let Err(err) = self.host.enqueue(task) {
                let (queued, pending) = tasks.split_at(pos);
                return Ok(self.abandon(&job_id, queued, pending, err));
            }
        }

        tracing::info!(
            job_id = %job_id,
            chunks = total_chunks,
            request_id = %ctx.request_id,
            "bulk run dispatched"
        );
        Ok(JobTicket {
            handle: JobHandle::Job(job_id),
            status: JobStatus::Queued,
            total_chunks,
            message: None,
            failed_ids: Vec::new(),
            report: None,
        })
    }

    fn record_job(&mut self, job: &JobRecord, tasks: &[ChunkTask]) -> Result<()> {
        self.host.create_job(job)?;
        for task in tasks {
            self.host.record_chunk(&ChunkRecord::queued(task))?;
        }
        Ok(())
    }

    /// Settle a dispatch that could not be completed
    ///
    /// Chunks already on the queue are aborted so workers skip them; the
    /// rest are failed. Nothing is raised: the caller gets a Failed ticket
    /// without a handle, and ledger errors during cleanup are only logged.
    fn abandon(
        &mut self,
        job_id: &JobId,
        queued: &[ChunkTask],
        pending: &[ChunkTask],
        err: impl std::fmt::Display,
    ) -> JobTicket {
        let reason = err.to_string();
        let settled = queued
            .iter()
            .map(|t| (t, JobStatus::Aborted))
            .chain(pending.iter().map(|t| (t, JobStatus::Failed)));
        for (task, status) in settled {
            if let Err(e) = self.settle_chunk(task, status, &reason) {
                tracing::debug!(job_id = %job_id, chunk = task.index, error = %e, "undispatched chunk not settled");
            }
        }
        let total_chunks = match self.refresh_job(job_id) {
            Ok(job) => job.total_chunks,
            Err(e) => {
                tracing::debug!(job_id = %job_id, error = %e, "job not recorded");
                (queued.len() + pending.len()) as u32
            }
        };
        tracing::warn!(job_id = %job_id, error = %reason, "chunk dispatch failed");
        JobTicket {
            handle: JobHandle::NoProcessId,
            status: JobStatus::Failed,
            total_chunks,
            message: Some(format!("dispatch of job {} failed: {}", job_id, reason)),
            failed_ids: Vec::new(),
            report: None,
        }
    }

    fn settle_chunk(&mut self, task: &ChunkTask, status: JobStatus, reason: &str) -> Result<()> {
        let mut chunk = ChunkRecord::queued(task);
        chunk.transition(status)?;
        chunk.message = Some(reason.to_string());
        self.host.update_chunk(&chunk)?;
        Ok(())
    }

    /// Parent type and id named by `target`; `None` when a lookup is empty
    fn locate_parent(&self, target: &ParentRef) -> Result<Option<(String, String)>> {
        let Some(field) = target.via_field.as_deref() else {
            return Ok(Some((target.object_type.clone(), target.record_id.clone())));
        };

        let parent_type = self
            .schema
            .get(&target.object_type)
            .and_then(|o| o.field(field))
            .and_then(|f| f.to_one())
            .map(|rel| rel.target_type.clone())
            .ok_or_else(|| {
                ExError::new(ExErrorKind::InvalidInput).with_message(format!(
                    "{}.{} is not a to-one lookup",
                    target.object_type, field
                ))
            })?;

        let record = self
            .host
            .fetch_by_ids(&target.object_type, std::slice::from_ref(&target.record_id))?
            .into_iter()
            .next()
            .ok_or_else(|| {
                ExError::new(ExErrorKind::NotFound)
                    .with_message(format!("{} {} not found", target.object_type, target.record_id))
            })?;

        Ok(record.get(field).as_text().map(|id| (parent_type, id)))
    }
}
