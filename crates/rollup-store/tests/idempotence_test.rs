//! Re-running unchanged data against the SQLite host writes nothing, for
//! targets whose stored JSON form is text (dates, date-times, long decimals)

use chrono::NaiveDate;
use rollup_core::guard::UnitOfWork;
use rollup_core::metadata::{MetadataResolver, ResolvedDefinition};
use rollup_core::model::{
    FieldDescriptor, FieldType, FieldValue, ObjectSchema, Operation, Record, RollupDefinition, SchemaRegistry,
};
use rollup_core::pipeline::{run_definitions, ParentSelection};
use rollup_core::EngineConfig;
use rollup_store::SqliteHost;
use rust_decimal::Decimal;

fn schema() -> SchemaRegistry {
    SchemaRegistry::new()
        .with_object(
            ObjectSchema::new("Opportunity")
                .with_field(FieldDescriptor::reference("AccountId", "Account", "Account"))
                .with_field(FieldDescriptor::new("Amount", FieldType::Number))
                .with_field(FieldDescriptor::new("CloseDate", FieldType::Date))
                .with_field(FieldDescriptor::new("TouchedAt", FieldType::DateTime)),
        )
        .with_object(
            ObjectSchema::new("Account")
                .with_field(FieldDescriptor::new("AvgAmount", FieldType::Number))
                .with_field(FieldDescriptor::new("LastClose", FieldType::Date))
                .with_field(FieldDescriptor::new("LastTouched", FieldType::DateTime)),
        )
}

fn seed(host: &mut SqliteHost) {
    let opportunities = r#"[
        {"Id": "o1", "AccountId": "a1", "Amount": 1, "CloseDate": "2024-01-15", "TouchedAt": "2024-01-15T08:00:00Z"},
        {"Id": "o2", "AccountId": "a1", "Amount": 1, "CloseDate": "2024-03-01", "TouchedAt": "2024-03-01T10:15:30.250Z"},
        {"Id": "o3", "AccountId": "a1", "Amount": 2, "CloseDate": "2024-02-10", "TouchedAt": "2024-02-10T12:00:00Z"}
    ]"#;
    host.import_records_json("Opportunity", opportunities, &schema()).unwrap();
    host.upsert_record(&Record::new("Account", "a1")).unwrap();
}

fn definitions() -> Vec<ResolvedDefinition> {
    let schema = schema();
    let config = EngineConfig::default();
    let resolver = MetadataResolver::new(&schema, &config);
    [
        ("avg-amount", "Amount", "AvgAmount", Operation::Average),
        ("last-close", "CloseDate", "LastClose", Operation::Max),
        ("last-touched", "TouchedAt", "LastTouched", Operation::Max),
    ]
    .into_iter()
    .map(|(id, source, target, op)| {
        let def = RollupDefinition::new("Opportunity", "AccountId", "Account", "Id", source, target, op).with_id(id);
        resolver.resolve(&def).unwrap()
    })
    .collect()
}

fn run(host: &mut SqliteHost, defs: &[ResolvedDefinition]) -> usize {
    let report = run_definitions(host, defs, &ParentSelection::All, &mut UnitOfWork::default(), 200).unwrap();
    assert!(report.write.failed.is_empty(), "{:?}", report.write.failed);
    report.write.write_calls
}

#[test]
fn test_second_run_writes_nothing_on_untyped_reads() {
    let mut host = SqliteHost::open_in_memory().unwrap();
    seed(&mut host);
    let defs = definitions();

    assert_eq!(run(&mut host, &defs), 1);
    let stored = host.get_record("Account", "a1").unwrap().unwrap();
    // no schema on the host: the JSON text comes back as is
    assert_eq!(stored.get("LastClose"), &FieldValue::text("2024-03-01"));
    assert!(matches!(stored.get("AvgAmount"), FieldValue::Text(_)));

    assert_eq!(run(&mut host, &defs), 0);
    assert_eq!(run(&mut host, &defs), 0);
}

#[test]
fn test_schema_aware_host_reads_typed_values() {
    let mut host = SqliteHost::open_in_memory().unwrap().with_schema(schema());
    seed(&mut host);
    let defs = definitions();

    assert_eq!(run(&mut host, &defs), 1);
    assert_eq!(run(&mut host, &defs), 0);

    let stored = host.get_record("Account", "a1").unwrap().unwrap();
    assert_eq!(
        stored.get("LastClose"),
        &FieldValue::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
    );
    assert_eq!(
        stored.get("AvgAmount"),
        &FieldValue::Number(Decimal::from(4) / Decimal::from(3))
    );
    assert_eq!(
        stored.get("LastTouched").as_text().as_deref(),
        Some("2024-03-01T10:15:30.250Z")
    );
}

#[test]
fn test_changed_child_is_written_once_then_settles() {
    let mut host = SqliteHost::open_in_memory().unwrap();
    seed(&mut host);
    let defs = definitions();
    run(&mut host, &defs);

    let moved = host
        .get_record("Opportunity", "o3")
        .unwrap()
        .unwrap()
        .with("CloseDate", "2024-06-30");
    host.upsert_record(&moved).unwrap();

    assert_eq!(run(&mut host, &defs), 1);
    assert_eq!(
        host.get_record("Account", "a1").unwrap().unwrap().get("LastClose"),
        &FieldValue::text("2024-06-30")
    );
    assert_eq!(run(&mut host, &defs), 0);
}
