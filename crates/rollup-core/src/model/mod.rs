pub mod definition;
pub mod record;
pub mod schema;
pub mod value;

pub use definition::{NullOrdering, Operation, OrderBy, RollupDefinition, SortDirection};
pub use record::Record;
pub use schema::{FieldDescriptor, FieldFamily, FieldType, ObjectSchema, Relationship, SchemaRegistry};
pub use value::FieldValue;
