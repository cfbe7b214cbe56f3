//! Parent Reset & Writer
//!
//! Computed values are diffed against the parent's stored value and only
//! real changes are staged. Staged changes are merged per parent and sent
//! to the host in batches; a failing record or batch never blocks the
//! others.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::RollupError;
use crate::evaluator::RollupValue;
use crate::host::RecordSink;
use crate::model::{FieldDescriptor, FieldValue, Record};

/// Field changes for one parent record
///
/// `expected` holds the values the diff was made against; hosts reject the
/// update when the stored value no longer matches (optimistic concurrency).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentUpdate {
    pub parent_id: String,
    pub fields: BTreeMap<String, FieldValue>,
    pub expected: BTreeMap<String, FieldValue>,
}

impl ParentUpdate {
    pub fn new(parent_id: impl Into<String>) -> Self {
        Self {
            parent_id: parent_id.into(),
            fields: BTreeMap::new(),
            expected: BTreeMap::new(),
        }
    }

    /// Names of the expected fields whose stored value has moved on
    pub fn conflicts(&self, current: &Record) -> Vec<&str> {
        self.expected
            .iter()
            .filter(|(field, expected)| !current.get(field).equivalent(expected))
            .map(|(field, _)| field.as_str())
            .collect()
    }
}

/// Host verdict for one record of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    pub parent_id: String,
    pub error: Option<String>,
}

impl WriteOutcome {
    pub fn ok(parent_id: impl Into<String>) -> Self {
        Self {
            parent_id: parent_id.into(),
            error: None,
        }
    }

    pub fn failed(parent_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            parent_id: parent_id.into(),
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteFailure {
    pub parent_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteReport {
    /// Field changes staged for writing
    pub staged: usize,
    /// Computed values equal to what is stored (or no-ops)
    pub unchanged: usize,
    /// Parent records written successfully
    pub succeeded: usize,
    pub failed: Vec<WriteFailure>,
    /// Host write operations issued
    pub write_calls: usize,
}

impl WriteReport {
    pub fn merge(&mut self, other: WriteReport) {
        self.staged += other.staged;
        self.unchanged += other.unchanged;
        self.succeeded += other.succeeded;
        self.failed.extend(other.failed);
        self.write_calls += other.write_calls;
    }

    pub fn failed_ids(&self) -> Vec<String> {
        self.failed.iter().map(|f| f.parent_id.clone()).collect()
    }

    /// `PartialWrite` listing the failed parents, if any failed
    pub fn partial_failure(&self) -> Option<RollupError> {
        if self.failed.is_empty() {
            return None;
        }
        let message = self
            .failed
            .iter()
            .map(|f| format!("{}: {}", f.parent_id, f.message))
            .collect::<Vec<_>>()
            .join("; ");
        Some(RollupError::PartialWrite {
            attempted: self.succeeded + self.failed.len(),
            failed_ids: self.failed_ids(),
            message,
        })
    }
}

/// Collects changes across definitions, then writes them in batches
#[derive(Debug)]
pub struct ParentWriter {
    batch_size: usize,
    /// parent type → parent id → merged update
    staged: BTreeMap<String, BTreeMap<String, ParentUpdate>>,
    staged_fields: usize,
    unchanged: usize,
}

impl ParentWriter {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            staged: BTreeMap::new(),
            staged_fields: 0,
            unchanged: 0,
        }
    }

    /// Diff `value` against `parent`'s stored target and stage real changes
    ///
    /// Returns whether a change was staged.
    pub fn stage(&mut self, parent: &Record, target: &FieldDescriptor, value: &RollupValue) -> bool {
        let Some(new_value) = value.resolve_for(target) else {
            self.unchanged += 1;
            return false;
        };
        let current = parent.get(&target.name);
        if new_value.matches_stored(current, target.field_type) {
            self.unchanged += 1;
            return false;
        }

        let update = self
            .staged
            .entry(parent.object_type.clone())
            .or_default()
            .entry(parent.id.clone())
            .or_insert_with(|| ParentUpdate::new(parent.id.clone()));
        update
            .expected
            .entry(target.name.clone())
            .or_insert_with(|| current.clone());
        if update.fields.insert(target.name.clone(), new_value).is_none() {
            self.staged_fields += 1;
        }
        true
    }

    /// Parent records with at least one staged change
    pub fn pending(&self) -> usize {
        self.staged.values().map(BTreeMap::len).sum()
    }

    /// Send everything staged to `sink`, `batch_size` parents per call
    pub fn flush<S: RecordSink + ?Sized>(&mut self, sink: &mut S) -> WriteReport {
        let mut report = WriteReport {
            staged: std::mem::take(&mut self.staged_fields),
            unchanged: std::mem::take(&mut self.unchanged),
            ..WriteReport::default()
        };

        for (object_type, updates) in std::mem::take(&mut self.staged) {
            let updates: Vec<ParentUpdate> = updates.into_values().collect();
            for batch in updates.chunks(self.batch_size) {
                report.write_calls += 1;
                match sink.update_records(&object_type, batch) {
                    Ok(outcomes) => {
                        for update in batch {
                            match outcomes.iter().find(|o| o.parent_id == update.parent_id) {
                                Some(WriteOutcome { error: None, .. }) => report.succeeded += 1,
                                Some(WriteOutcome {
                                    error: Some(message),
                                    ..
                                }) => report.failed.push(WriteFailure {
                                    parent_id: update.parent_id.clone(),
                                    message: message.clone(),
                                }),
                                None => report.failed.push(WriteFailure {
                                    parent_id: update.parent_id.clone(),
                                    message: "host reported no outcome".to_string(),
                                }),
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            object_type = %object_type,
                            batch = batch.len(),
                            error = %e,
                            "write batch failed"
                        );
                        report.failed.extend(batch.iter().map(|u| WriteFailure {
                            parent_id: u.parent_id.clone(),
                            message: e.to_string(),
                        }));
                    }
                }
            }
        }

        tracing::debug!(
            staged = report.staged,
            unchanged = report.unchanged,
            succeeded = report.succeeded,
            failed = report.failed.len(),
            write_calls = report.write_calls,
            "parent writes flushed"
        );
        report
    }
}
