//! Host environment boundary
//!
//! The engine never touches storage directly. Records, definitions, job
//! state and the work queue are reached through these traits; the SQLite
//! store and the in-memory host both implement all of them.

use crate::errors::Result;
use crate::jobs::{ChunkRecord, ChunkTask, JobId, JobRecord};
use crate::metadata::{RawDefinition, RawOrderBy};
use crate::model::Record;
use crate::writer::{ParentUpdate, WriteOutcome};

/// Read access to host records
///
/// Every method returns records in the host's fetch order, which is the
/// order FIRST/LAST fall back to when a definition has no order-bys.
pub trait RecordSource {
    fn fetch_all(&self, object_type: &str) -> Result<Vec<Record>>;

    /// Records whose id is in `ids`; unknown ids are silently absent
    fn fetch_by_ids(&self, object_type: &str, ids: &[String]) -> Result<Vec<Record>>;

    /// Records whose `field` renders to one of `values`
    fn fetch_by_field(&self, object_type: &str, field: &str, values: &[String]) -> Result<Vec<Record>>;

    fn count(&self, object_type: &str) -> Result<usize>;

    fn list_ids(&self, object_type: &str) -> Result<Vec<String>>;
}

/// Write access to parent records
pub trait RecordSink {
    /// Apply one batch of updates as a single host write operation
    ///
    /// Per-record failures are reported in the returned outcomes; an `Err`
    /// means the whole call failed and nothing in the batch was applied.
    fn update_records(&mut self, object_type: &str, updates: &[ParentUpdate]) -> Result<Vec<WriteOutcome>>;
}

/// Read-only access to externally authored definitions
pub trait DefinitionSource {
    fn load_definitions(&self) -> Result<Vec<RawDefinition>>;

    /// Order-by children for a definition that arrived without them loaded
    fn find_order_bys(&self, definition_id: &str) -> Result<Vec<RawOrderBy>>;
}

/// Durable job and chunk bookkeeping
pub trait JobTracker {
    fn create_job(&mut self, job: &JobRecord) -> Result<()>;
    fn update_job(&mut self, job: &JobRecord) -> Result<()>;
    fn get_job(&self, job_id: &JobId) -> Result<Option<JobRecord>>;
    fn record_chunk(&mut self, chunk: &ChunkRecord) -> Result<()>;
    fn update_chunk(&mut self, chunk: &ChunkRecord) -> Result<()>;
    fn get_chunk(&self, job_id: &JobId, index: u32) -> Result<Option<ChunkRecord>>;
    fn list_chunks(&self, job_id: &JobId) -> Result<Vec<ChunkRecord>>;
}

/// Queue of chunk tasks executed by host workers
pub trait JobQueue {
    fn enqueue(&mut self, task: &ChunkTask) -> Result<()>;
    fn dequeue(&mut self) -> Result<Option<ChunkTask>>;
}

/// Everything the engine needs from its host
pub trait RollupHost: RecordSource + RecordSink + DefinitionSource + JobTracker + JobQueue {}

impl<T> RollupHost for T where T: RecordSource + RecordSink + DefinitionSource + JobTracker + JobQueue {}
