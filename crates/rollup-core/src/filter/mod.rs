//! Filter language for calculation items
//!
//! A small where-clause dialect: comparisons, `LIKE`, `IN`/`NOT IN`,
//! `AND`/`OR`/`NOT` and parentheses over plain or dotted field names.
//! Clauses joined with ` ||| ` are ANDed. Filters are parsed and bound to
//! schema fields once, when a definition is resolved.

pub mod eval;
pub mod parser;

pub use parser::{parse, CompareOp, Expr};

use crate::errors::{Result, RollupError};
use crate::model::{FieldType, FieldValue, SchemaRegistry};
use crate::relationship::{resolve_field, FieldRef};

/// A parsed filter bound to the fields of one object type
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    source: String,
    expr: Expr<FieldRef>,
}

fn bind_literal(source: &str, field: &FieldRef, literal: &FieldValue) -> Result<FieldValue> {
    if literal.is_null() {
        return Ok(FieldValue::Null);
    }
    let field_type: FieldType = field.field_type();
    match literal.coerce(field_type) {
        FieldValue::Null => Err(RollupError::InvalidFilter {
            filter: source.to_string(),
            position: 0,
            reason: format!(
                "literal {} cannot be compared with {} ({})",
                literal,
                field.path(),
                field_type
            ),
        }),
        coerced => Ok(coerced),
    }
}

impl Filter {
    /// Parse `source` and bind it to fields of `root_type`
    ///
    /// Returns `Ok(None)` for a blank filter.
    ///
    /// # Errors
    ///
    /// Returns `RollupError::InvalidFilter` for syntax errors, unknown or
    /// unreadable fields and literals that do not fit their field's type.
    pub fn compile(source: &str, schema: &SchemaRegistry, root_type: &str) -> Result<Option<Self>> {
        let Some(expr) = parse(source)? else {
            return Ok(None);
        };

        let expr = expr.try_map(&mut |name: String, literals: &[&FieldValue]| {
            let field = resolve_field(schema, root_type, &name).map_err(|e| RollupError::InvalidFilter {
                filter: source.to_string(),
                position: source.find(name.as_str()).unwrap_or(0),
                reason: e.to_string(),
            })?;
            if !field.field.readable {
                return Err(RollupError::InvalidFilter {
                    filter: source.to_string(),
                    position: source.find(name.as_str()).unwrap_or(0),
                    reason: format!("field {} is not readable", field.path()),
                });
            }
            let values = literals
                .iter()
                .map(|lit| bind_literal(source, &field, lit))
                .collect::<Result<Vec<_>>>()?;
            Ok((field, values))
        })?;

        Ok(Some(Filter {
            source: source.to_string(),
            expr,
        }))
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr<FieldRef> {
        &self.expr
    }

    /// Fields the filter reads (used to hydrate related records)
    pub fn field_refs(&self) -> Vec<&FieldRef> {
        self.expr.fields()
    }

    pub fn matches<L>(&self, mut lookup: L) -> bool
    where
        L: FnMut(&FieldRef) -> FieldValue,
    {
        eval::evaluate(&self.expr, &mut lookup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldDescriptor, ObjectSchema, Record};

    fn schema() -> SchemaRegistry {
        SchemaRegistry::new()
            .with_object(
                ObjectSchema::new("Opportunity")
                    .with_field(FieldDescriptor::new("Amount", FieldType::Currency))
                    .with_field(FieldDescriptor::new("StageName", FieldType::Picklist))
                    .with_field(FieldDescriptor::new("CloseDate", FieldType::Date))
                    .with_field(FieldDescriptor::new("IsWon", FieldType::Boolean))
                    .with_field(FieldDescriptor::new("Secret", FieldType::Text).unreadable())
                    .with_field(FieldDescriptor::reference("AccountId", "Account", "Account")),
            )
            .with_object(
                ObjectSchema::new("Account").with_field(FieldDescriptor::new("Region", FieldType::Text)),
            )
    }

    fn direct(record: &Record) -> impl FnMut(&FieldRef) -> FieldValue + '_ {
        move |f: &FieldRef| record.get(&f.field.name).clone()
    }

    #[test]
    fn test_compile_and_match() {
        let filter = Filter::compile(
            "Amount > 100 AND StageName IN ('Closed Won', 'Negotiation') ||| CloseDate >= '2024-01-01'",
            &schema(),
            "Opportunity",
        )
        .unwrap()
        .unwrap();

        let hit = Record::new("Opportunity", "o1")
            .with("Amount", 150)
            .with("StageName", "closed won")
            .with("CloseDate", chrono::NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        let miss = hit.clone().with("Amount", 50);

        assert!(filter.matches(direct(&hit)));
        assert!(!filter.matches(direct(&miss)));
    }

    #[test]
    fn test_blank_filter_is_none() {
        assert!(Filter::compile("", &schema(), "Opportunity").unwrap().is_none());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = Filter::compile("Probability > 3", &schema(), "Opportunity").unwrap_err();
        assert!(matches!(err, RollupError::InvalidFilter { .. }));
    }

    #[test]
    fn test_unreadable_field_rejected() {
        let err = Filter::compile("Secret = 'x'", &schema(), "Opportunity").unwrap_err();
        assert!(err.to_string().contains("not readable"));
    }

    #[test]
    fn test_literal_type_checked() {
        let err = Filter::compile("Amount = 'lots'", &schema(), "Opportunity").unwrap_err();
        assert!(err.to_string().contains("cannot be compared"));
        assert!(Filter::compile("IsWon = true", &schema(), "Opportunity").unwrap().is_some());
    }

    #[test]
    fn test_dotted_field_binds_relationship() {
        let filter = Filter::compile("Account.Region = 'EMEA'", &schema(), "Opportunity")
            .unwrap()
            .unwrap();
        let refs = filter.field_refs();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].hops.len(), 1);
        assert_eq!(refs[0].owner_type(), "Account");
    }
}
