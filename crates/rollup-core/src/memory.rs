//! In-memory host
//!
//! Implements every host trait over plain collections. Used by tests and by
//! embedders that already hold their data in memory. Failures can be
//! injected per object type, per parent id and for the queue.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::errors::{Result, RollupError};
use crate::host::{DefinitionSource, JobQueue, JobTracker, RecordSink, RecordSource};
use crate::jobs::{ChunkRecord, ChunkTask, JobId, JobRecord};
use crate::metadata::{RawDefinition, RawOrderBy};
use crate::model::Record;
use crate::writer::{ParentUpdate, WriteOutcome};

#[derive(Debug, Default)]
pub struct InMemoryHost {
    /// Records per object type, in insertion (fetch) order
    records: HashMap<String, Vec<Record>>,
    definitions: Vec<RawDefinition>,
    order_bys: HashMap<String, Vec<RawOrderBy>>,
    jobs: BTreeMap<JobId, JobRecord>,
    chunks: BTreeMap<(JobId, u32), ChunkRecord>,
    queue: VecDeque<ChunkTask>,

    /// Enqueues still accepted before the queue starts refusing work
    enqueue_budget: Option<usize>,
    fail_ledger: bool,
    failing_write_ids: HashSet<String>,
    failing_read_types: HashSet<String>,
    write_calls: usize,
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record (replacement keeps its fetch position)
    pub fn insert(&mut self, record: Record) {
        let list = self.records.entry(record.object_type.clone()).or_default();
        match list.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => list.push(record),
        }
    }

    pub fn remove(&mut self, object_type: &str, id: &str) -> Option<Record> {
        let list = self.records.get_mut(object_type)?;
        let pos = list.iter().position(|r| r.id == id)?;
        Some(list.remove(pos))
    }

    pub fn get(&self, object_type: &str, id: &str) -> Option<&Record> {
        self.records.get(object_type)?.iter().find(|r| r.id == id)
    }

    pub fn add_definition(&mut self, raw: RawDefinition) {
        self.definitions.push(raw);
    }

    pub fn add_order_bys(&mut self, definition_id: &str, order_bys: Vec<RawOrderBy>) {
        self.order_bys.insert(definition_id.to_string(), order_bys);
    }

    pub fn fail_enqueue(&mut self, fail: bool) {
        self.enqueue_budget = fail.then_some(0);
    }

    /// Accept `accepted` more enqueues, then refuse every later one
    pub fn fail_enqueue_after(&mut self, accepted: usize) {
        self.enqueue_budget = Some(accepted);
    }

    /// Make job and chunk creation fail
    pub fn fail_job_ledger(&mut self, fail: bool) {
        self.fail_ledger = fail;
    }

    pub fn fail_writes_for(&mut self, parent_id: &str) {
        self.failing_write_ids.insert(parent_id.to_string());
    }

    pub fn clear_write_failures(&mut self) {
        self.failing_write_ids.clear();
    }

    pub fn fail_reads_for(&mut self, object_type: &str) {
        self.failing_read_types.insert(object_type.to_string());
    }

    pub fn clear_read_failures(&mut self) {
        self.failing_read_types.clear();
    }

    /// Number of `update_records` calls made so far
    pub fn write_calls(&self) -> usize {
        self.write_calls
    }

    pub fn queued_tasks(&self) -> usize {
        self.queue.len()
    }

    fn records_of(&self, object_type: &str) -> Result<&[Record]> {
        if self.failing_read_types.contains(object_type) {
            return Err(RollupError::data_access(
                "fetch_records",
                format!("reads of {} are failing", object_type),
            ));
        }
        Ok(self.records.get(object_type).map(Vec::as_slice).unwrap_or(&[]))
    }
}

impl RecordSource for InMemoryHost {
    fn fetch_all(&self, object_type: &str) -> Result<Vec<Record>> {
        Ok(self.records_of(object_type)?.to_vec())
    }

    fn fetch_by_ids(&self, object_type: &str, ids: &[String]) -> Result<Vec<Record>> {
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        Ok(self
            .records_of(object_type)?
            .iter()
            .filter(|r| wanted.contains(r.id.as_str()))
            .cloned()
            .collect())
    }

    fn fetch_by_field(&self, object_type: &str, field: &str, values: &[String]) -> Result<Vec<Record>> {
        let wanted: HashSet<&str> = values.iter().map(String::as_str).collect();
        Ok(self
            .records_of(object_type)?
            .iter()
            .filter(|r| {
                r.get(field)
                    .as_text()
                    .is_some_and(|v| wanted.contains(v.as_str()))
            })
            .cloned()
            .collect())
    }

    fn count(&self, object_type: &str) -> Result<usize> {
        Ok(self.records_of(object_type)?.len())
    }

    fn list_ids(&self, object_type: &str) -> Result<Vec<String>> {
        Ok(self.records_of(object_type)?.iter().map(|r| r.id.clone()).collect())
    }
}

impl RecordSink for InMemoryHost {
    fn update_records(&mut self, object_type: &str, updates: &[ParentUpdate]) -> Result<Vec<WriteOutcome>> {
        self.write_calls += 1;
        let mut outcomes = Vec::with_capacity(updates.len());
        for update in updates {
            if self.failing_write_ids.contains(&update.parent_id) {
                outcomes.push(WriteOutcome::failed(&update.parent_id, "write rejected by host"));
                continue;
            }
            let Some(record) = self
                .records
                .get_mut(object_type)
                .and_then(|list| list.iter_mut().find(|r| r.id == update.parent_id))
            else {
                outcomes.push(WriteOutcome::failed(&update.parent_id, "parent record not found"));
                continue;
            };
            let conflicts = update.conflicts(record);
            if !conflicts.is_empty() {
                outcomes.push(WriteOutcome::failed(
                    &update.parent_id,
                    format!("concurrent modification of {}", conflicts.join(", ")),
                ));
                continue;
            }
            for (field, value) in &update.fields {
                record.set(field.clone(), value.clone());
            }
            outcomes.push(WriteOutcome::ok(&update.parent_id));
        }
        Ok(outcomes)
    }
}

impl DefinitionSource for InMemoryHost {
    fn load_definitions(&self) -> Result<Vec<RawDefinition>> {
        Ok(self.definitions.clone())
    }

    fn find_order_bys(&self, definition_id: &str) -> Result<Vec<RawOrderBy>> {
        Ok(self.order_bys.get(definition_id).cloned().unwrap_or_default())
    }
}

impl JobTracker for InMemoryHost {
    fn create_job(&mut self, job: &JobRecord) -> Result<()> {
        if self.fail_ledger {
            return Err(RollupError::data_access("create_job", "job ledger is read-only"));
        }
        self.jobs.insert(job.job_id.clone(), job.clone());
        Ok(())
    }

    fn update_job(&mut self, job: &JobRecord) -> Result<()> {
        match self.jobs.get_mut(&job.job_id) {
            Some(existing) => {
                *existing = job.clone();
                Ok(())
            }
            None => Err(RollupError::JobNotFound {
                job_id: job.job_id.to_string(),
            }),
        }
    }

    fn get_job(&self, job_id: &JobId) -> Result<Option<JobRecord>> {
        Ok(self.jobs.get(job_id).cloned())
    }

    fn record_chunk(&mut self, chunk: &ChunkRecord) -> Result<()> {
        if self.fail_ledger {
            return Err(RollupError::data_access("record_chunk", "job ledger is read-only"));
        }
        self.chunks
            .insert((chunk.job_id.clone(), chunk.index), chunk.clone());
        Ok(())
    }

    fn update_chunk(&mut self, chunk: &ChunkRecord) -> Result<()> {
        match self.chunks.get_mut(&(chunk.job_id.clone(), chunk.index)) {
            Some(existing) => {
                *existing = chunk.clone();
                Ok(())
            }
            None => Err(RollupError::ChunkNotFound {
                job_id: chunk.job_id.to_string(),
                index: chunk.index,
            }),
        }
    }

    fn get_chunk(&self, job_id: &JobId, index: u32) -> Result<Option<ChunkRecord>> {
        Ok(self.chunks.get(&(job_id.clone(), index)).cloned())
    }

    fn list_chunks(&self, job_id: &JobId) -> Result<Vec<ChunkRecord>> {
        Ok(self
            .chunks
            .range((job_id.clone(), 0)..=(job_id.clone(), u32::MAX))
            .map(|(_, c)| c.clone())
            .collect())
    }
}

impl JobQueue for InMemoryHost {
    fn enqueue(&mut self, task: &ChunkTask) -> Result<()> {
        match self.enqueue_budget.as_mut() {
            Some(0) => {
                return Err(RollupError::DispatchFailed {
                    reason: "queue is not accepting work".to_string(),
                })
            }
            Some(left) => *left -= 1,
            None => {}
        }
        self.queue.push_back(task.clone());
        Ok(())
    }

    fn dequeue(&mut self) -> Result<Option<ChunkTask>> {
        Ok(self.queue.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldValue;

    #[test]
    fn test_fetch_preserves_insertion_order() {
        let mut host = InMemoryHost::new();
        for id in ["c3", "c1", "c2"] {
            host.insert(Record::new("Contact", id).with("AccountId", "a1"));
        }
        let ids: Vec<String> = host
            .fetch_by_field("Contact", "AccountId", &["a1".to_string()])
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["c3", "c1", "c2"]);
    }

    #[test]
    fn test_update_checks_expected_values() {
        let mut host = InMemoryHost::new();
        host.insert(Record::new("Account", "a1").with("Total", 5));
        let mut update = ParentUpdate::new("a1");
        update.fields.insert("Total".to_string(), FieldValue::number(7));
        update.expected.insert("Total".to_string(), FieldValue::number(4));

        let outcomes = host.update_records("Account", &[update]).unwrap();
        assert!(outcomes[0].error.as_deref().unwrap().contains("concurrent"));
        assert_eq!(host.get("Account", "a1").unwrap().get("Total"), &FieldValue::number(5));
    }

    #[test]
    fn test_injected_failures() {
        let mut host = InMemoryHost::new();
        host.fail_reads_for("Contact");
        assert!(matches!(host.fetch_all("Contact"), Err(RollupError::DataAccess { .. })));

        host.fail_enqueue(true);
        let task = ChunkTask {
            job_id: JobId::new(),
            index: 0,
            definition: crate::model::RollupDefinition::new(
                "Contact", "AccountId", "Account", "Id", "Id", "N", crate::model::Operation::Count,
            ),
            parent_ids: Vec::new(),
        };
        assert!(matches!(host.enqueue(&task), Err(RollupError::DispatchFailed { .. })));
    }
}
