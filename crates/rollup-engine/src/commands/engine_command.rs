//! Engine-level commands that mutate host state.

#![allow(clippy::result_large_err)]

use rollup_core::jobs::{ChunkRecord, JobId};
use rollup_core::pipeline::RunReport;
use rollup_core::{RollupDefinition, RollupHost};
use rollup_store::errors::Result;

use crate::commands::recalc::{JobTicket, ParentRef};
use crate::engine::RollupEngine;

/// Engine-level commands that write records, jobs or the queue.
#[derive(Debug, Clone)]
pub enum EngineCommand {
    /// Recalculate every parent of the given definitions.
    RecalculateBulk {
        definitions: Vec<RollupDefinition>,
        invocation: Option<String>,
    },
    /// Recalculate from a string-encoded definition payload.
    RecalculateFromPayload { payload: String, invocation: String },
    /// Recalculate one parent with every stored definition targeting it.
    RecalculateParent {
        target: ParentRef,
        invocation: Option<String>,
    },
    /// Run queued chunks; `None` drains the queue.
    RunPending { max: Option<usize> },
    RetryFailedChunks { job_id: JobId },
    AbortChunk { job_id: JobId, index: u32 },
}

/// Result of applying an engine command.
#[derive(Debug, Clone)]
pub enum EngineCommandResult {
    /// A bulk run finished inline or was queued.
    Dispatched(JobTicket),
    /// A parent-scoped run finished.
    Recalculated(RunReport),
    ChunksRun(usize),
    ChunksRequeued(usize),
    ChunkAborted(ChunkRecord),
}

/// Apply an engine command against the engine's host.
pub fn apply_engine_command<H: RollupHost>(
    cmd: EngineCommand,
    engine: &mut RollupEngine<'_, H>,
) -> Result<EngineCommandResult> {
    match cmd {
        EngineCommand::RecalculateBulk {
            definitions,
            invocation,
        } => engine
            .recalculate_bulk(&definitions, invocation.as_deref())
            .map(EngineCommandResult::Dispatched),
        EngineCommand::RecalculateFromPayload { payload, invocation } => engine
            .recalculate_from_config_payload(&payload, &invocation)
            .map(EngineCommandResult::Dispatched),
        EngineCommand::RecalculateParent { target, invocation } => engine
            .recalculate_parent(&target, invocation.as_deref())
            .map(EngineCommandResult::Recalculated),
        EngineCommand::RunPending { max } => engine.run_pending(max).map(EngineCommandResult::ChunksRun),
        EngineCommand::RetryFailedChunks { job_id } => engine
            .retry_failed_chunks(&job_id)
            .map(EngineCommandResult::ChunksRequeued),
        EngineCommand::AbortChunk { job_id, index } => engine
            .abort_chunk(&job_id, index)
            .map(EngineCommandResult::ChunkAborted),
    }
}
