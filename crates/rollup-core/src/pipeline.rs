//! Evaluation pipeline
//!
//! Runs resolved definitions end to end for a selection of parents:
//! planner fetches and groups, the guard claims each (definition, parent)
//! pair, the evaluator computes and the writer stages. Staged changes are
//! flushed once per run so batches span definitions.

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::evaluator::{evaluate_group, RollupValue};
use crate::guard::UnitOfWork;
use crate::host::{RecordSink, RecordSource};
use crate::metadata::ResolvedDefinition;
use crate::model::Record;
use crate::planner::{build_groups, fetch_children, fetch_parents, parent_key, single_group, RelatedRecordCache};
use crate::writer::{ParentWriter, WriteReport};

/// Which parents of a definition's parent type to recalculate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "values", rename_all = "snake_case")]
pub enum ParentSelection {
    /// Every parent record of the type
    All,
    /// Parent records by record id
    Ids(Vec<String>),
    /// Parent records by group key (the lookup value children carry)
    Keys(Vec<String>),
}

impl ParentSelection {
    pub fn is_empty(&self) -> bool {
        match self {
            ParentSelection::All => false,
            ParentSelection::Ids(v) | ParentSelection::Keys(v) => v.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub definitions: usize,
    pub groups: usize,
    pub parents_evaluated: usize,
    pub skipped_by_guard: usize,
    pub write: WriteReport,
}

impl RunReport {
    pub fn merge(&mut self, other: RunReport) {
        self.definitions += other.definitions;
        self.groups += other.groups;
        self.parents_evaluated += other.parents_evaluated;
        self.skipped_by_guard += other.skipped_by_guard;
        self.write.merge(other.write);
    }
}

/// Parent records and the calculation items under them
fn load<S: RecordSource + ?Sized>(
    source: &S,
    def: &ResolvedDefinition,
    selection: &ParentSelection,
) -> Result<(Vec<Record>, Vec<Record>)> {
    match selection {
        ParentSelection::All => Ok((
            source.fetch_all(def.parent_type())?,
            source.fetch_all(def.calc_item_type())?,
        )),
        ParentSelection::Ids(ids) => {
            let parents = source.fetch_by_ids(def.parent_type(), ids)?;
            let keys = keys_of(def, &parents);
            let items = fetch_children(source, def, &keys)?;
            Ok((parents, items))
        }
        ParentSelection::Keys(keys) => {
            let parents = fetch_parents(source, def, keys)?;
            let items = fetch_children(source, def, keys)?;
            Ok((parents, items))
        }
    }
}

fn keys_of(def: &ResolvedDefinition, parents: &[Record]) -> Vec<String> {
    let mut keys: Vec<String> = parents.iter().filter_map(|p| parent_key(def, p)).collect();
    keys.sort();
    keys.dedup();
    keys
}

/// Evaluate one definition and stage its changes on `writer`
///
/// Parents without qualifying children get a reset. Pairs already claimed
/// in `uow` are skipped.
pub fn stage_definition<S: RecordSource + ?Sized>(
    source: &S,
    def: &ResolvedDefinition,
    selection: &ParentSelection,
    uow: &mut UnitOfWork,
    writer: &mut ParentWriter,
) -> Result<RunReport> {
    let mut report = RunReport {
        definitions: 1,
        ..RunReport::default()
    };
    if selection.is_empty() {
        return Ok(report);
    }

    let (parents, items) = load(source, def, selection)?;
    let mut cache = RelatedRecordCache::new();
    cache.hydrate(source, &items, &def.item_fields())?;
    let groups = build_groups(def, &items, &cache);
    report.groups = groups.len();

    for parent in &parents {
        if !uow.claim(&def.key, &parent.id) {
            report.skipped_by_guard += 1;
            continue;
        }
        let value = match parent_key(def, parent).and_then(|k| groups.get(&k)) {
            Some(group) => evaluate_group(def, &group.items)?,
            None => RollupValue::Reset,
        };
        writer.stage(parent, &def.target, &value);
        report.parents_evaluated += 1;
    }

    tracing::debug!(
        definition = %def.definition.display_name(),
        parents = parents.len(),
        items = items.len(),
        groups = report.groups,
        evaluated = report.parents_evaluated,
        "definition staged"
    );
    Ok(report)
}

/// Run every definition for `selection`, then flush all staged writes
///
/// Read failures abort the run before anything is written; write failures
/// are reported per parent in the returned report.
pub fn run_definitions<H: RecordSource + RecordSink + ?Sized>(
    host: &mut H,
    defs: &[ResolvedDefinition],
    selection: &ParentSelection,
    uow: &mut UnitOfWork,
    write_batch_size: usize,
) -> Result<RunReport> {
    let mut writer = ParentWriter::new(write_batch_size);
    let mut report = RunReport::default();
    for def in defs {
        report.merge(stage_definition(&*host, def, selection, uow, &mut writer)?);
    }
    report.write = writer.flush(host);
    Ok(report)
}

/// Aggregate `items` as one group without touching any parent
pub fn preview<S: RecordSource + ?Sized>(source: &S, def: &ResolvedDefinition, items: &[Record]) -> Result<RollupValue> {
    let mut cache = RelatedRecordCache::new();
    cache.hydrate(source, items, &def.item_fields())?;
    evaluate_group(def, &single_group(def, items, &cache))
}
