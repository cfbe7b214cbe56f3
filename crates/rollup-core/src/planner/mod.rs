//! Query Planner
//!
//! Fetches the calculation items and parents a definition needs, partitions
//! items into rollup groups keyed by resolved parent key and prepares each
//! group (filter, order, limit) for the evaluator.

pub mod cache;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::evaluator::{sort_items, GroupItem};
use crate::host::RecordSource;
use crate::metadata::ResolvedDefinition;
use crate::model::{OrderBy, Record};

pub use cache::RelatedRecordCache;

/// An insert (`old` absent), delete (`new` absent) or update of a calculation item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemChange {
    pub old: Option<Record>,
    pub new: Option<Record>,
}

impl ItemChange {
    pub fn insert(record: Record) -> Self {
        Self {
            old: None,
            new: Some(record),
        }
    }

    pub fn update(old: Record, new: Record) -> Self {
        Self {
            old: Some(old),
            new: Some(new),
        }
    }

    pub fn delete(record: Record) -> Self {
        Self {
            old: Some(record),
            new: None,
        }
    }

    pub fn object_type(&self) -> Option<&str> {
        self.new
            .as_ref()
            .or(self.old.as_ref())
            .map(|r| r.object_type.as_str())
    }
}

/// Items sharing one parent key, in evaluation order
#[derive(Debug, Clone, PartialEq)]
pub struct RollupGroup {
    pub parent_key: String,
    pub items: Vec<GroupItem>,
}

/// Parent key of a calculation item, if it has one
pub fn item_parent_key(def: &ResolvedDefinition, item: &Record, cache: &RelatedRecordCache) -> Option<String> {
    cache
        .resolve(item, &def.group_key)
        .as_text()
        .filter(|k| !k.is_empty())
}

/// Key under which a parent's children are grouped
pub fn parent_key(def: &ResolvedDefinition, parent: &Record) -> Option<String> {
    parent
        .get(&def.parent_match_field.name)
        .as_text()
        .filter(|k| !k.is_empty())
}

fn qualifies(def: &ResolvedDefinition, item: &Record, cache: &RelatedRecordCache) -> bool {
    match &def.filter {
        Some(filter) => filter.matches(|f| cache.resolve(item, f)),
        None => true,
    }
}

fn to_group_item(def: &ResolvedDefinition, item: &Record, cache: &RelatedRecordCache) -> GroupItem {
    GroupItem {
        id: item.id.clone(),
        source: cache
            .resolve(item, &def.source)
            .coerce(def.source.field_type()),
        sort_keys: def
            .order_bys
            .iter()
            .map(|o| cache.resolve(item, &o.field).coerce(o.field.field_type()))
            .collect(),
    }
}

fn order_chain(def: &ResolvedDefinition) -> Vec<OrderBy> {
    def.order_bys.iter().map(|o| o.order_by.clone()).collect()
}

/// Order a group by the definition's chain and apply its limit
pub fn prepare_group(def: &ResolvedDefinition, items: &mut Vec<GroupItem>) {
    sort_items(&order_chain(def), items);
    if let Some(limit) = def.definition.limit {
        items.truncate(limit as usize);
    }
}

/// Filter, then partition items by parent key
///
/// Every qualifying item with a parent key lands in exactly one group; fetch
/// order is kept within a group. Groups are ordered, sorted and truncated.
pub fn build_groups(def: &ResolvedDefinition, items: &[Record], cache: &RelatedRecordCache) -> BTreeMap<String, RollupGroup> {
    let mut groups: BTreeMap<String, RollupGroup> = BTreeMap::new();
    for item in items {
        if !qualifies(def, item, cache) {
            continue;
        }
        let Some(key) = item_parent_key(def, item, cache) else {
            continue;
        };
        groups
            .entry(key.clone())
            .or_insert_with(|| RollupGroup {
                parent_key: key,
                items: Vec::new(),
            })
            .items
            .push(to_group_item(def, item, cache));
    }
    for group in groups.values_mut() {
        prepare_group(def, &mut group.items);
    }
    groups
}

/// Treat `items` as a single group regardless of their parent keys
pub fn single_group(def: &ResolvedDefinition, items: &[Record], cache: &RelatedRecordCache) -> Vec<GroupItem> {
    let mut group: Vec<GroupItem> = items
        .iter()
        .filter(|item| qualifies(def, item, cache))
        .map(|item| to_group_item(def, item, cache))
        .collect();
    prepare_group(def, &mut group);
    group
}

/// Parent keys whose aggregate may have changed
///
/// Covers reparenting (old and new parent), items entering or leaving the
/// filter, and value changes on the source or any order-by field. Unchanged
/// items add nothing.
pub fn affected_parent_keys(def: &ResolvedDefinition, changes: &[ItemChange], cache: &RelatedRecordCache) -> BTreeSet<String> {
    let mut keys = BTreeSet::new();
    let relevant = |r: &Record| -> Vec<crate::model::FieldValue> {
        std::iter::once(&def.source)
            .chain(def.order_bys.iter().map(|o| &o.field))
            .map(|f| cache.resolve(r, f))
            .collect()
    };

    for change in changes {
        if change.object_type().is_some_and(|t| !t.eq_ignore_ascii_case(def.calc_item_type())) {
            continue;
        }
        let old = change
            .old
            .as_ref()
            .filter(|r| qualifies(def, r, cache))
            .and_then(|r| item_parent_key(def, r, cache).map(|k| (k, r)));
        let new = change
            .new
            .as_ref()
            .filter(|r| qualifies(def, r, cache))
            .and_then(|r| item_parent_key(def, r, cache).map(|k| (k, r)));

        match (old, new) {
            (None, None) => {}
            (Some((k, _)), None) | (None, Some((k, _))) => {
                keys.insert(k);
            }
            (Some((old_key, old_rec)), Some((new_key, new_rec))) => {
                if old_key != new_key {
                    keys.insert(old_key);
                    keys.insert(new_key);
                } else {
                    let before = relevant(old_rec);
                    let after = relevant(new_rec);
                    if before.iter().zip(after.iter()).any(|(a, b)| !a.equivalent(b)) {
                        keys.insert(new_key);
                    }
                }
            }
        }
    }
    keys
}

/// Every calculation item under the given parent keys
///
/// Direct definitions fetch by the lookup field. Grandparent definitions
/// walk down the path one hop at a time, from the parent type to the items.
pub fn fetch_children<S: RecordSource + ?Sized>(source: &S, def: &ResolvedDefinition, parent_keys: &[String]) -> Result<Vec<Record>> {
    if parent_keys.is_empty() {
        return Ok(Vec::new());
    }
    match &def.grandparent {
        None => source.fetch_by_field(
            def.calc_item_type(),
            &def.calc_lookup.field.name,
            parent_keys,
        ),
        Some(path) => {
            let mut ids: Vec<String> = parent_keys.to_vec();
            let mut records = Vec::new();
            for hop in path.hops().iter().rev() {
                if ids.is_empty() {
                    return Ok(Vec::new());
                }
                records = source.fetch_by_field(&hop.from_type, &hop.lookup_field, &ids)?;
                ids = records.iter().map(|r| r.id.clone()).collect();
            }
            Ok(records)
        }
    }
}

/// Parent records matching the given keys
pub fn fetch_parents<S: RecordSource + ?Sized>(source: &S, def: &ResolvedDefinition, keys: &[String]) -> Result<Vec<Record>> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }
    if def.parent_match_field.name == "Id" {
        source.fetch_by_ids(def.parent_type(), keys)
    } else {
        source.fetch_by_field(def.parent_type(), &def.parent_match_field.name, keys)
    }
}
