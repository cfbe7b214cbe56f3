use rollup_core::metadata::{MetadataResolver, ResolvedDefinition};
use rollup_core::model::{FieldDescriptor, FieldType, ObjectSchema, Record, RollupDefinition, SchemaRegistry};
use rollup_core::{EngineConfig, InMemoryHost};

/// Sales-shaped schema: line items under opportunities under accounts owned by users
#[allow(dead_code)]
pub fn sales_schema() -> SchemaRegistry {
    SchemaRegistry::new()
        .with_object(
            ObjectSchema::new("Contact")
                .with_field(FieldDescriptor::new("FirstName", FieldType::Text))
                .with_field(FieldDescriptor::new("Score", FieldType::Number))
                .with_field(FieldDescriptor::new("CreatedDate", FieldType::DateTime))
                .with_field(FieldDescriptor::reference("AccountId", "Account", "Account")),
        )
        .with_object(
            ObjectSchema::new("OpportunityLineItem")
                .with_field(FieldDescriptor::new("Quantity", FieldType::Number))
                .with_field(FieldDescriptor::reference("OpportunityId", "Opportunity", "Opportunity")),
        )
        .with_object(
            ObjectSchema::new("Opportunity")
                .with_field(FieldDescriptor::new("Amount", FieldType::Currency).with_scale(2))
                .with_field(FieldDescriptor::new("StageName", FieldType::Picklist))
                .with_field(FieldDescriptor::new("CloseDate", FieldType::Date))
                .with_field(FieldDescriptor::reference("AccountId", "Account", "Account")),
        )
        .with_object(
            ObjectSchema::new("Account")
                .with_field(FieldDescriptor::new("ContactNames", FieldType::LongText))
                .with_field(FieldDescriptor::new("FirstContact", FieldType::Text))
                .with_field(FieldDescriptor::new("LastContact", FieldType::Text))
                .with_field(FieldDescriptor::new("TopStage", FieldType::Text))
                .with_field(FieldDescriptor::new("RareStage", FieldType::Text))
                .with_field(FieldDescriptor::new("TotalAmount", FieldType::Currency).with_scale(2))
                .with_field(FieldDescriptor::new("LineItemCount", FieldType::Integer))
                .with_field(FieldDescriptor::reference("OwnerId", "Owner", "User")),
        )
        .with_object(ObjectSchema::new("User").with_field(FieldDescriptor::new("Region", FieldType::Picklist)))
}

#[allow(dead_code)]
pub fn resolve(def: RollupDefinition) -> ResolvedDefinition {
    MetadataResolver::new(&sales_schema(), &EngineConfig::default())
        .resolve(&def)
        .expect("definition should resolve")
}

#[allow(dead_code)]
pub fn contact(id: &str, account: &str, first_name: &str) -> Record {
    Record::new("Contact", id)
        .with("AccountId", account)
        .with("FirstName", first_name)
}

#[allow(dead_code)]
pub fn opportunity(id: &str, account: &str, amount: i64, stage: &str) -> Record {
    Record::new("Opportunity", id)
        .with("AccountId", account)
        .with("Amount", amount)
        .with("StageName", stage)
}

/// Host holding the given accounts and nothing else
#[allow(dead_code)]
pub fn host_with_accounts(ids: &[&str]) -> InMemoryHost {
    let mut host = InMemoryHost::new();
    for id in ids {
        host.insert(Record::new("Account", *id));
    }
    host
}
