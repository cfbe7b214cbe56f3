//! The rollup pipeline running against the SQLite host

use rollup_core::guard::UnitOfWork;
use rollup_core::host::{DefinitionSource, JobQueue, JobTracker};
use rollup_core::jobs::{ChunkRecord, ChunkTask, JobId, JobRecord, JobStatus};
use rollup_core::metadata::MetadataResolver;
use rollup_core::model::{FieldDescriptor, FieldType, FieldValue, ObjectSchema, Operation, OrderBy, Record, RollupDefinition, SchemaRegistry};
use rollup_core::pipeline::{run_definitions, ParentSelection};
use rollup_core::EngineConfig;
use rollup_store::SqliteHost;

fn schema() -> SchemaRegistry {
    SchemaRegistry::new()
        .with_object(
            ObjectSchema::new("Contact")
                .with_field(FieldDescriptor::new("FirstName", FieldType::Text))
                .with_field(FieldDescriptor::new("Score", FieldType::Number))
                .with_field(FieldDescriptor::reference("AccountId", "Account", "Account")),
        )
        .with_object(
            ObjectSchema::new("Account")
                .with_field(FieldDescriptor::new("Names", FieldType::LongText))
                .with_field(FieldDescriptor::new("Best", FieldType::Text)),
        )
}

fn seeded() -> SqliteHost {
    let mut host = SqliteHost::open_in_memory().unwrap();
    let contacts = r#"[
        {"Id": "c1", "AccountId": "a1", "FirstName": "A", "Score": "3"},
        {"Id": "c2", "AccountId": "a1", "FirstName": "B", "Score": 9},
        {"Id": "c3", "AccountId": "a1", "FirstName": "C", "Score": 1}
    ]"#;
    host.import_records_json("Contact", contacts, &schema()).unwrap();
    host.upsert_record(&Record::new("Account", "a1")).unwrap();
    host.upsert_record(&Record::new("Account", "a2").with("Names", "stale"))
        .unwrap();
    host
}

#[test]
fn test_concat_over_sqlite_host_in_fetch_order() {
    let mut host = seeded();
    let def = MetadataResolver::new(&schema(), &EngineConfig::default())
        .resolve(
            &RollupDefinition::new("Contact", "AccountId", "Account", "Id", "FirstName", "Names", Operation::Concat)
                .with_delimiter(", "),
        )
        .unwrap();

    let report = run_definitions(&mut host, &[def.clone()], &ParentSelection::All, &mut UnitOfWork::default(), 200)
        .unwrap();
    assert_eq!(report.write.succeeded, 2);

    let a1 = host.get_record("Account", "a1").unwrap().unwrap();
    let a2 = host.get_record("Account", "a2").unwrap().unwrap();
    assert_eq!(a1.get("Names"), &FieldValue::text("A, B, C"));
    assert!(a2.get("Names").is_null());

    // idempotent: nothing left to write
    let again = run_definitions(&mut host, &[def], &ParentSelection::All, &mut UnitOfWork::default(), 200).unwrap();
    assert_eq!(again.write.write_calls, 0);
}

#[test]
fn test_stored_definitions_hydrate_order_bys() {
    let mut host = seeded();
    let schema = schema();
    let config = EngineConfig::default();
    let resolver = MetadataResolver::new(&schema, &config);
    let def = RollupDefinition::new("Contact", "AccountId", "Account", "Id", "FirstName", "Best", Operation::Last)
        .with_id("best-contact")
        .with_order_by(OrderBy::asc("Score"));
    host.save_definition(&def, resolver.field_names()).unwrap();

    let raw = host.load_definitions().unwrap();
    let normalized = resolver.normalize(&raw[0], Some(&host)).unwrap();
    assert_eq!(normalized.order_bys.len(), 1);

    let resolved = resolver.resolve(&normalized).unwrap();
    run_definitions(
        &mut host,
        &[resolved],
        &ParentSelection::Ids(vec!["a1".to_string()]),
        &mut UnitOfWork::default(),
        200,
    )
    .unwrap();
    // "3" was imported as text and coerced to a number, so 9 wins
    assert_eq!(
        host.get_record("Account", "a1").unwrap().unwrap().get("Best"),
        &FieldValue::text("B")
    );
}

#[test]
fn test_chunk_state_persists_across_connections() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("jobs.db");
    let job_id = JobId::new();
    {
        let mut host = SqliteHost::open(&path).unwrap();
        let task = ChunkTask {
            job_id: job_id.clone(),
            index: 0,
            definition: RollupDefinition::new("Contact", "AccountId", "Account", "Id", "FirstName", "Names", Operation::Concat),
            parent_ids: vec!["a1".to_string()],
        };
        host.create_job(&JobRecord::new(job_id.clone(), 1, None)).unwrap();
        host.record_chunk(&ChunkRecord::queued(&task)).unwrap();
        host.enqueue(&task).unwrap();
    }

    let mut host = SqliteHost::open(&path).unwrap();
    let task = host.dequeue().unwrap().expect("task should survive reopen");
    assert_eq!(task.job_id, job_id);
    let chunk = host.get_chunk(&job_id, 0).unwrap().unwrap();
    assert_eq!(chunk.status, JobStatus::Queued);
    assert_eq!(chunk.parent_ids, vec!["a1".to_string()]);
}
