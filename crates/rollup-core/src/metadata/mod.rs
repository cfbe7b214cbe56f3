//! Metadata Resolver: raw definitions in, validated accessor tables out

pub mod namespace;
pub mod resolver;

pub use namespace::{FieldNameMap, NamespaceInfo};
pub use resolver::{
    normalize_definition, order_by_children, to_raw_definition, MetadataResolver, OrderByChildren,
    RawDefinition, RawOrderBy, ResolvedDefinition, ResolvedOrderBy,
};
