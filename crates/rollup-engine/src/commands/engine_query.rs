//! Engine-level read-only query surface.
//!
//! `apply_engine_query` is the single entry point for reads. Unlike
//! `apply_engine_command`, it takes the engine by shared reference and never
//! writes records, jobs or the queue.

#![allow(clippy::result_large_err)]

use rollup_core::evaluator::RollupValue;
use rollup_core::metadata::NamespaceInfo;
use rollup_core::{Record, RollupDefinition, RollupHost};
use rollup_store::errors::Result;

use crate::commands::discovery::DefinitionsByType;
use crate::commands::jobs::JobStatusReport;
use crate::engine::RollupEngine;

/// Read-only queries supported by the engine.
#[derive(Debug, Clone)]
pub enum EngineQuery {
    /// Status of a job handle; non-job handles are echoed back.
    JobStatus { handle: String },
    /// Active stored definitions grouped by calculation item type.
    DefinitionsByCalcItemType,
    /// Every stored definition in normalized form.
    StoredDefinitions,
    NamespaceInfo,
    /// Flat string form of the given definitions.
    SerializablePayload { definitions: Vec<RollupDefinition> },
    /// Aggregate items with one definition without writing.
    Preview {
        definition: RollupDefinition,
        items: Vec<Record>,
    },
}

/// Result of applying an engine query.
#[derive(Debug, Clone)]
pub enum EngineQueryResult {
    JobStatus(JobStatusReport),
    DefinitionsByCalcItemType(DefinitionsByType),
    StoredDefinitions(Vec<RollupDefinition>),
    NamespaceInfo(NamespaceInfo),
    SerializablePayload(String),
    Preview(RollupValue),
}

/// Apply a read-only query.
pub fn apply_engine_query<H: RollupHost>(query: EngineQuery, engine: &RollupEngine<'_, H>) -> Result<EngineQueryResult> {
    match query {
        EngineQuery::JobStatus { handle } => engine.get_job_status(&handle).map(EngineQueryResult::JobStatus),
        EngineQuery::DefinitionsByCalcItemType => engine
            .list_available_definitions_by_calc_item_type()
            .map(EngineQueryResult::DefinitionsByCalcItemType),
        EngineQuery::StoredDefinitions => engine.stored_definitions().map(EngineQueryResult::StoredDefinitions),
        EngineQuery::NamespaceInfo => engine.namespace_info().map(EngineQueryResult::NamespaceInfo),
        EngineQuery::SerializablePayload { definitions } => engine
            .to_serializable_payload(&definitions)
            .map(EngineQueryResult::SerializablePayload),
        EngineQuery::Preview { definition, items } => engine
            .recalculate_single(&definition, &items)
            .map(EngineQueryResult::Preview),
    }
}
