use serde::{Deserialize, Serialize};

use crate::errors::{Result, RollupError};
use crate::model::{FieldDescriptor, FieldType, ObjectSchema, SchemaRegistry};

/// One to-one lookup traversal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hop {
    pub from_type: String,
    /// Reference field on `from_type` holding the related id
    pub lookup_field: String,
    pub relationship_name: String,
    pub to_type: String,
}

/// Accessor for a (possibly related) field of a root object type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRef {
    pub root_type: String,
    pub hops: Vec<Hop>,
    pub field: FieldDescriptor,
}

impl FieldRef {
    pub fn direct(root_type: impl Into<String>, field: FieldDescriptor) -> Self {
        Self {
            root_type: root_type.into(),
            hops: Vec::new(),
            field,
        }
    }

    pub fn is_direct(&self) -> bool {
        self.hops.is_empty()
    }

    pub fn field_type(&self) -> FieldType {
        self.field.field_type
    }

    /// Object type holding the final field
    pub fn owner_type(&self) -> &str {
        self.hops
            .last()
            .map(|h| h.to_type.as_str())
            .unwrap_or(&self.root_type)
    }

    /// Dotted path using relationship names (`Account.Owner.Region`)
    pub fn path(&self) -> String {
        self.hops
            .iter()
            .map(|h| h.relationship_name.as_str())
            .chain(std::iter::once(self.field.name.as_str()))
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// A validated grandparent path from the calculation item to its ancestor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipPath {
    pub raw: String,
    pub target: FieldRef,
}

impl RelationshipPath {
    pub fn hops(&self) -> &[Hop] {
        &self.target.hops
    }

    /// Type reached after the last hop (the parent type)
    pub fn final_type(&self) -> &str {
        self.target.owner_type()
    }

    /// Relationship names with the final field swapped for `Id`
    ///
    /// `Opportunity.Account.Name` joins on `Opportunity.Account.Id`.
    pub fn join_field(&self) -> String {
        self.hops()
            .iter()
            .map(|h| h.relationship_name.as_str())
            .chain(std::iter::once("Id"))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Accessor yielding the ancestor's id for a calculation item
    pub fn key_ref(&self) -> FieldRef {
        FieldRef {
            root_type: self.target.root_type.clone(),
            hops: self.target.hops.clone(),
            field: FieldDescriptor::new("Id", FieldType::Id).read_only(),
        }
    }
}

fn path_error(path: &str, hop: &str, reason: impl Into<String>) -> RollupError {
    RollupError::PathResolution {
        path: path.to_string(),
        hop: hop.to_string(),
        reason: reason.into(),
    }
}

fn object<'a>(schema: &'a SchemaRegistry, path: &str, name: &str) -> Result<&'a ObjectSchema> {
    schema
        .get(name)
        .ok_or_else(|| path_error(path, name, format!("unknown object type '{}'", name)))
}

/// Resolve a dotted path starting at `root_type`
///
/// A leading segment naming the root type itself is skipped unless the root
/// type also has a field of that name. Every segment but the last must be a
/// to-one lookup (matched by relationship name or field name); the last
/// segment must be a field on the type reached.
///
/// # Errors
///
/// Returns `RollupError::PathResolution` naming the first hop that fails.
pub fn resolve_path(schema: &SchemaRegistry, root_type: &str, path: &str) -> Result<RelationshipPath> {
    let segments: Vec<&str> = path.split('.').map(str::trim).collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(path_error(path, path, "empty path segment"));
    }

    let root = object(schema, path, root_type)?;
    let mut segments = segments.as_slice();
    if segments.len() > 1 && segments[0].eq_ignore_ascii_case(&root.name) && root.field(segments[0]).is_none() {
        segments = &segments[1..];
    }

    let Some((last, hop_segments)) = segments.split_last() else {
        return Err(path_error(path, path, "empty path"));
    };

    let mut current = root;
    let mut hops = Vec::with_capacity(hop_segments.len());
    for segment in hop_segments {
        let field = current.relationship_field(segment).ok_or_else(|| {
            path_error(
                path,
                segment,
                format!("no lookup named '{}' on {}", segment, current.name),
            )
        })?;
        let relationship = field.to_one().ok_or_else(|| {
            path_error(path, segment, format!("{}.{} is not a to-one relationship", current.name, field.name))
        })?;
        let next = object(schema, path, &relationship.target_type)?;
        hops.push(Hop {
            from_type: current.name.clone(),
            lookup_field: field.name.clone(),
            relationship_name: relationship.relationship_name.clone(),
            to_type: next.name.clone(),
        });
        current = next;
    }

    let field = current.field(last).ok_or_else(|| {
        path_error(path, last, format!("no field named '{}' on {}", last, current.name))
    })?;

    Ok(RelationshipPath {
        raw: path.to_string(),
        target: FieldRef {
            root_type: root.name.clone(),
            hops,
            field: field.clone(),
        },
    })
}

/// Resolve a plain or dotted field reference on `root_type`
pub fn resolve_field(schema: &SchemaRegistry, root_type: &str, field: &str) -> Result<FieldRef> {
    resolve_path(schema, root_type, field).map(|p| p.target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldDescriptor, FieldType, ObjectSchema};

    fn schema() -> SchemaRegistry {
        SchemaRegistry::new()
            .with_object(
                ObjectSchema::new("OpportunityLineItem")
                    .with_field(FieldDescriptor::reference("OpportunityId", "Opportunity", "Opportunity"))
                    .with_field(FieldDescriptor::new("Quantity", FieldType::Number)),
            )
            .with_object(
                ObjectSchema::new("Opportunity")
                    .with_field(FieldDescriptor::reference("AccountId", "Account", "Account"))
                    .with_field(FieldDescriptor::new("Amount", FieldType::Currency)),
            )
            .with_object(
                ObjectSchema::new("Account")
                    .with_field(FieldDescriptor::reference("OwnerId", "Owner", "User"))
                    .with_field(FieldDescriptor::new("Name", FieldType::Text))
                    .with_field({
                        let mut contacts = FieldDescriptor::reference("Contacts", "Contacts", "Contact");
                        if let Some(r) = contacts.relationship.as_mut() {
                            r.to_one = false;
                        }
                        contacts
                    }),
            )
            .with_object(ObjectSchema::new("User").with_field(FieldDescriptor::new("Region", FieldType::Picklist)))
            .with_object(ObjectSchema::new("Contact"))
    }

    #[test]
    fn test_two_hop_path() {
        let path = resolve_path(&schema(), "OpportunityLineItem", "Opportunity.AccountId.Name").unwrap();
        assert_eq!(path.hops().len(), 2);
        assert_eq!(path.final_type(), "Account");
        assert_eq!(path.join_field(), "Opportunity.Account.Id");
        assert_eq!(path.target.path(), "Opportunity.Account.Name");
    }

    #[test]
    fn test_leading_root_segment_skipped() {
        let path = resolve_path(&schema(), "Opportunity", "Opportunity.AccountId.OwnerId").unwrap();
        assert_eq!(path.hops().len(), 1);
        assert_eq!(path.hops()[0].lookup_field, "AccountId");
        assert_eq!(path.target.field.name, "OwnerId");
        assert_eq!(path.final_type(), "Account");
    }

    #[test]
    fn test_missing_hop_is_path_error() {
        let err = resolve_path(&schema(), "Opportunity", "Campaign.Name").unwrap_err();
        match err {
            RollupError::PathResolution { hop, .. } => assert_eq!(hop, "Campaign"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_to_many_hop_rejected() {
        let err = resolve_path(&schema(), "Account", "Contacts.Id").unwrap_err();
        assert!(err.to_string().contains("not a to-one"));
    }

    #[test]
    fn test_non_lookup_hop_rejected() {
        let err = resolve_path(&schema(), "Opportunity", "Amount.Name").unwrap_err();
        assert!(matches!(err, RollupError::PathResolution { .. }));
    }

    #[test]
    fn test_direct_field() {
        let f = resolve_field(&schema(), "Opportunity", "amount").unwrap();
        assert!(f.is_direct());
        assert_eq!(f.field.name, "Amount");
        assert_eq!(f.owner_type(), "Opportunity");
    }

    #[test]
    fn test_key_ref_targets_ancestor_id() {
        let path = resolve_path(&schema(), "OpportunityLineItem", "Opportunity.Account.Owner.Region").unwrap();
        let key = path.key_ref();
        assert_eq!(key.hops.len(), 3);
        assert_eq!(key.field.name, "Id");
        assert_eq!(key.owner_type(), "User");
    }
}
