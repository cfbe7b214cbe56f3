use rollup_core::metadata::{to_raw_definition, FieldNameMap, RawDefinition};
use rollup_core::model::{FieldDescriptor, FieldType, FieldValue, ObjectSchema, Operation, Record, RollupDefinition, SchemaRegistry};
use rollup_core::{EngineConfig, InMemoryHost};

/// Contacts under accounts
#[allow(dead_code)]
pub fn schema() -> SchemaRegistry {
    SchemaRegistry::new()
        .with_object(
            ObjectSchema::new("Contact")
                .with_field(FieldDescriptor::new("FirstName", FieldType::Text))
                .with_field(FieldDescriptor::new("Score", FieldType::Number))
                .with_field(FieldDescriptor::reference("AccountId", "Account", "Account")),
        )
        .with_object(
            ObjectSchema::new("Account")
                .with_field(FieldDescriptor::new("ContactCount", FieldType::Integer))
                .with_field(FieldDescriptor::new("ScoreTotal", FieldType::Number))
                .with_field(FieldDescriptor::new("ContactNames", FieldType::LongText)),
        )
}

/// Config that runs inline up to `sync_threshold` items, chunking by `chunk_size`
#[allow(dead_code)]
pub fn config(sync_threshold: usize, chunk_size: usize) -> EngineConfig {
    EngineConfig {
        sync_threshold,
        chunk_size,
        ..EngineConfig::default()
    }
}

/// Accounts `a0..` each with contacts `c<i>-0..` scoring 1, 2, ...
#[allow(dead_code)]
pub fn seeded_host(accounts: usize, contacts_per_account: usize) -> InMemoryHost {
    let mut host = InMemoryHost::new();
    for a in 0..accounts {
        host.insert(Record::new("Account", format!("a{}", a)));
        for c in 0..contacts_per_account {
            host.insert(
                Record::new("Contact", format!("c{}-{}", a, c))
                    .with("AccountId", format!("a{}", a))
                    .with("FirstName", format!("N{}", c))
                    .with("Score", (c + 1) as i64),
            );
        }
    }
    host
}

#[allow(dead_code)]
pub fn count_def() -> RollupDefinition {
    RollupDefinition::new("Contact", "AccountId", "Account", "Id", "Id", "ContactCount", Operation::Count)
        .with_id("count-contacts")
}

#[allow(dead_code)]
pub fn score_def() -> RollupDefinition {
    RollupDefinition::new("Contact", "AccountId", "Account", "Id", "Score", "ScoreTotal", Operation::Sum)
        .with_id("sum-scores")
}

#[allow(dead_code)]
pub fn raw(def: &RollupDefinition) -> RawDefinition {
    to_raw_definition(def, &FieldNameMap::new(""))
}

#[allow(dead_code)]
pub fn field(host: &InMemoryHost, object_type: &str, id: &str, field: &str) -> FieldValue {
    host.get(object_type, id)
        .map(|r| r.get(field).clone())
        .unwrap_or(FieldValue::Null)
}
