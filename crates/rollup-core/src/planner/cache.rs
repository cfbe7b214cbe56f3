//! Related-record cache for dotted field access

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::errors::Result;
use crate::host::RecordSource;
use crate::model::{FieldValue, Record};
use crate::relationship::{FieldRef, Hop};

/// Records reached through lookups, keyed by (object type, id)
#[derive(Debug, Default)]
pub struct RelatedRecordCache {
    records: HashMap<(String, String), Record>,
}

/// Hops that need a fetched record; an `Id` at the end of the path can be
/// read from the last lookup field instead.
fn fetch_depth(field: &FieldRef) -> usize {
    if field.field.name == "Id" && !field.hops.is_empty() {
        field.hops.len() - 1
    } else {
        field.hops.len()
    }
}

fn lookup_id(record: &Record, hop: &Hop) -> Option<String> {
    record
        .get(&hop.lookup_field)
        .as_text()
        .filter(|id| !id.is_empty())
}

impl RelatedRecordCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: Record) {
        self.records
            .insert((record.object_type.clone(), record.id.clone()), record);
    }

    pub fn get(&self, object_type: &str, id: &str) -> Option<&Record> {
        self.records.get(&(object_type.to_string(), id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn follow<'a>(&'a self, record: &'a Record, hops: &[Hop]) -> Option<&'a Record> {
        hops.iter().try_fold(record, |current, hop| {
            let id = lookup_id(current, hop)?;
            self.get(&hop.to_type, &id)
        })
    }

    /// Load every record the given accessors need, one batched fetch per
    /// object type and hop depth
    pub fn hydrate<S: RecordSource + ?Sized>(
        &mut self,
        source: &S,
        items: &[Record],
        fields: &[&FieldRef],
    ) -> Result<()> {
        let max_depth = fields.iter().map(|f| fetch_depth(f)).max().unwrap_or(0);
        for depth in 0..max_depth {
            let mut wanted: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
            for field in fields.iter().filter(|f| fetch_depth(f) > depth) {
                let hop = &field.hops[depth];
                for item in items {
                    let Some(at_depth) = self.follow(item, &field.hops[..depth]) else {
                        continue;
                    };
                    if let Some(id) = lookup_id(at_depth, hop) {
                        if self.get(&hop.to_type, &id).is_none() {
                            wanted.entry(hop.to_type.clone()).or_default().insert(id);
                        }
                    }
                }
            }
            for (object_type, ids) in wanted {
                let ids: Vec<String> = ids.into_iter().collect();
                tracing::trace!(object_type = %object_type, depth, count = ids.len(), "hydrating related records");
                for record in source.fetch_by_ids(&object_type, &ids)? {
                    self.insert(record);
                }
            }
        }
        Ok(())
    }

    /// Read `field` for `item`, walking lookups through the cache
    ///
    /// Broken or unloaded links read as Null.
    pub fn resolve(&self, item: &Record, field: &FieldRef) -> FieldValue {
        let depth = fetch_depth(field);
        let Some(holder) = self.follow(item, &field.hops[..depth]) else {
            return FieldValue::Null;
        };
        if depth < field.hops.len() {
            return lookup_id(holder, &field.hops[depth])
                .map(FieldValue::Text)
                .unwrap_or(FieldValue::Null);
        }
        holder.get(&field.field.name).clone()
    }
}
