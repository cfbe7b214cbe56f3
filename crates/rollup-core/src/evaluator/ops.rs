//! Per-operation folds over an ordered group

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;

use crate::errors::{Result, RollupError};
use crate::model::FieldValue;

use super::{GroupItem, RollupValue};

fn numbers(items: &[GroupItem]) -> impl Iterator<Item = Decimal> + '_ {
    items.iter().filter_map(|i| i.source.as_decimal())
}

fn checked_sum(mut values: impl Iterator<Item = Decimal>, definition: &str) -> Result<Decimal> {
    values.try_fold(Decimal::ZERO, |acc, v| {
        acc.checked_add(v).ok_or_else(|| RollupError::NumericOverflow {
            definition: definition.to_string(),
        })
    })
}

/// Nulls are skipped; a group of only nulls sums to zero
pub fn sum(items: &[GroupItem], definition: &str) -> Result<RollupValue> {
    checked_sum(numbers(items), definition).map(|d| RollupValue::Value(FieldValue::Number(d)))
}

pub fn count(items: &[GroupItem], count_nulls: bool) -> RollupValue {
    let n = if count_nulls {
        items.len()
    } else {
        items.iter().filter(|i| !i.source.is_blank()).count()
    };
    RollupValue::Value(FieldValue::Number(Decimal::from(n as u64)))
}

/// No non-null values yields the no-op sentinel rather than a division by zero
pub fn average(items: &[GroupItem], definition: &str) -> Result<RollupValue> {
    let values: Vec<Decimal> = numbers(items).collect();
    if values.is_empty() {
        return Ok(RollupValue::NoOp);
    }
    let total = checked_sum(values.iter().copied(), definition)?;
    total
        .checked_div(Decimal::from(values.len() as u64))
        .map(|avg| RollupValue::Value(FieldValue::Number(avg)))
        .ok_or_else(|| RollupError::NumericOverflow {
            definition: definition.to_string(),
        })
}

pub fn min(items: &[GroupItem]) -> RollupValue {
    items
        .iter()
        .map(|i| &i.source)
        .filter(|v| !v.is_blank())
        .min_by(|a, b| a.total_cmp(b))
        .map(|v| RollupValue::Value(v.clone()))
        .unwrap_or(RollupValue::Reset)
}

pub fn max(items: &[GroupItem]) -> RollupValue {
    items
        .iter()
        .map(|i| &i.source)
        .filter(|v| !v.is_blank())
        .max_by(|a, b| a.total_cmp(b))
        .map(|v| RollupValue::Value(v.clone()))
        .unwrap_or(RollupValue::Reset)
}

/// Join non-blank values in group order
///
/// With `split` each value is first broken on the delimiter and its pieces
/// trimmed. `distinct` keeps the first occurrence of each exact string.
pub fn concat(items: &[GroupItem], delimiter: &str, split: bool, distinct: bool) -> RollupValue {
    let mut parts: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for text in items.iter().filter_map(|i| i.source.as_text()) {
        let pieces: Vec<String> = if split && !delimiter.is_empty() {
            text.split(delimiter).map(|p| p.trim().to_string()).collect()
        } else {
            vec![text]
        };
        for piece in pieces.into_iter().filter(|p| !p.is_empty()) {
            if distinct && !seen.insert(piece.clone()) {
                continue;
            }
            parts.push(piece);
        }
    }

    if parts.is_empty() {
        RollupValue::Reset
    } else {
        RollupValue::Value(FieldValue::Text(parts.join(delimiter)))
    }
}

pub fn first(items: &[GroupItem]) -> RollupValue {
    items
        .first()
        .map(|i| RollupValue::Value(i.source.clone()))
        .unwrap_or(RollupValue::Reset)
}

pub fn last(items: &[GroupItem]) -> RollupValue {
    items
        .last()
        .map(|i| RollupValue::Value(i.source.clone()))
        .unwrap_or(RollupValue::Reset)
}

/// Items with a value, stably sorted by how often that value occurs
///
/// This is the implicit ascending occurrence-count criterion placed ahead
/// of the group's own order: LEAST takes the first entry, MOST the last.
fn by_frequency(items: &[GroupItem]) -> Vec<&GroupItem> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for key in items.iter().filter_map(|i| i.source.occurrence_key()) {
        *counts.entry(key).or_default() += 1;
    }
    let mut candidates: Vec<(&GroupItem, usize)> = items
        .iter()
        .filter(|i| !i.source.is_blank())
        .filter_map(|i| {
            let key = i.source.occurrence_key()?;
            counts.get(&key).map(|c| (i, *c))
        })
        .collect();
    candidates.sort_by_key(|(_, c)| *c);
    candidates.into_iter().map(|(i, _)| i).collect()
}

pub fn most(items: &[GroupItem]) -> RollupValue {
    by_frequency(items)
        .last()
        .map(|i| RollupValue::Value(i.source.clone()))
        .unwrap_or(RollupValue::Reset)
}

pub fn least(items: &[GroupItem]) -> RollupValue {
    by_frequency(items)
        .first()
        .map(|i| RollupValue::Value(i.source.clone()))
        .unwrap_or(RollupValue::Reset)
}
