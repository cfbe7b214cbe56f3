//! Evaluator: one aggregate value per rollup group
//!
//! Groups arrive already filtered, ordered and truncated by the planner.
//! All arithmetic is decimal.

pub mod ops;
pub mod ordering;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::metadata::ResolvedDefinition;
use crate::model::{FieldDescriptor, FieldFamily, FieldValue, Operation};

pub use ordering::{compare_keys, sort_items};

/// A calculation item reduced to what the evaluator reads
#[derive(Debug, Clone, PartialEq)]
pub struct GroupItem {
    pub id: String,
    /// Source value coerced to the source field type
    pub source: FieldValue,
    /// One value per order-by criterion
    pub sort_keys: Vec<FieldValue>,
}

/// Outcome of evaluating one group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RollupValue {
    /// Write this value to the target field
    Value(FieldValue),
    /// Clear the target to its empty/zero value
    Reset,
    /// Leave the target untouched
    NoOp,
}

impl RollupValue {
    /// The value the Writer should store, if any
    pub fn resolve_for(&self, target: &FieldDescriptor) -> Option<FieldValue> {
        match self {
            RollupValue::Value(v) => Some(v.coerce(target.field_type).rounded(target.scale)),
            RollupValue::Reset => Some(reset_value(target)),
            RollupValue::NoOp => None,
        }
    }
}

/// Zero for numbers, false for booleans, null for everything else
pub fn reset_value(target: &FieldDescriptor) -> FieldValue {
    match target.field_type.family() {
        FieldFamily::Numeric => FieldValue::Number(Decimal::ZERO),
        FieldFamily::Boolean => FieldValue::Boolean(false),
        FieldFamily::Text | FieldFamily::Temporal => FieldValue::Null,
    }
}

/// Evaluate a prepared group for `def`
///
/// An empty group always yields `Reset`, whatever the operation.
///
/// # Errors
///
/// Returns `RollupError::NumericOverflow` when decimal arithmetic overflows.
pub fn evaluate_group(def: &ResolvedDefinition, items: &[GroupItem]) -> Result<RollupValue> {
    if items.is_empty() {
        return Ok(RollupValue::Reset);
    }
    let d = &def.definition;
    let value = match d.operation {
        Operation::Sum => ops::sum(items, &def.key)?,
        Operation::Count => ops::count(items, d.count_nulls),
        Operation::Average => ops::average(items, &def.key)?,
        Operation::Min => ops::min(items),
        Operation::Max => ops::max(items),
        Operation::Concat => ops::concat(items, &d.concat_delimiter, d.split_delimiter_on_source, false),
        Operation::ConcatDistinct => {
            ops::concat(items, &d.concat_delimiter, d.split_delimiter_on_source, true)
        }
        Operation::First => ops::first(items),
        Operation::Last => ops::last(items),
        Operation::Most => ops::most(items),
        Operation::Least => ops::least(items),
    };
    tracing::trace!(definition = %def.key, items = items.len(), ?value, "group evaluated");
    Ok(value)
}
