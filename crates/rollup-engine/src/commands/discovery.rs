//! Read-only discovery for definition pickers and payload builders

use std::collections::BTreeMap;

use rollup_core::host::DefinitionSource;
use rollup_core::metadata::namespace::KEY_ORDER_BYS;
use rollup_core::metadata::{to_raw_definition, FieldNameMap, NamespaceInfo, RawDefinition};
use rollup_core::{RollupDefinition, RollupError, RollupHost};
use rollup_core_types::RequestContext;
use rollup_store::errors::Result;
use serde_json::Value;

use crate::engine::{observe, RollupEngine};

/// Active definitions grouped by calculation item type
pub type DefinitionsByType = BTreeMap<String, Vec<RawDefinition>>;

impl<'a, H: RollupHost> RollupEngine<'a, H> {
    /// Active stored definitions keyed by calculation item type
    ///
    /// Relationship-valued fields are dropped from each entry and the
    /// order-by collection is always present and fully loaded, so every
    /// entry can be sent back as a payload unchanged.
    ///
    /// # Errors
    ///
    /// Read failures and stored definitions that do not normalize.
    pub fn list_available_definitions_by_calc_item_type(&self) -> Result<DefinitionsByType> {
        let ctx = RequestContext::new();
        observe("list_available_definitions_by_calc_item_type", &ctx, || {
            let resolver = self.resolver();
            let names = resolver.field_names();
            let source: &dyn DefinitionSource = &*self.host;

            let mut by_type = DefinitionsByType::new();
            for raw in self.host.load_definitions()? {
                let def = resolver.normalize(&raw, Some(source))?;
                if !def.active {
                    continue;
                }
                let mut entry = strip_relationship_fields(raw);
                let mut hydrated = to_raw_definition(&def, names);
                let key = names.effective(KEY_ORDER_BYS).to_string();
                if let Some(order_bys) = hydrated.remove(&key) {
                    entry.remove(KEY_ORDER_BYS);
                    entry.insert(key, order_bys);
                }
                by_type.entry(def.calc_item_type.clone()).or_default().push(entry);
            }
            Ok(by_type)
        })
    }

    /// Effective key names for the deployment namespace
    ///
    /// # Errors
    ///
    /// Never fails; returns `Result` like every other public operation.
    pub fn namespace_info(&self) -> Result<NamespaceInfo> {
        let ctx = RequestContext::new();
        observe("namespace_info", &ctx, || Ok(FieldNameMap::new(&self.config.namespace).info()))
    }

    /// Flat string form of `definitions`, accepted by
    /// [`Self::recalculate_from_config_payload`]
    ///
    /// # Errors
    ///
    /// JSON encoding failures.
    pub fn to_serializable_payload(&self, definitions: &[RollupDefinition]) -> Result<String> {
        let ctx = RequestContext::new();
        observe("to_serializable_payload", &ctx, || {
            let names = FieldNameMap::new(&self.config.namespace);
            let entries: Vec<Value> = definitions
                .iter()
                .map(|d| Value::Object(to_raw_definition(d, &names)))
                .collect();
            Ok(serde_json::to_string(&entries).map_err(RollupError::from)?)
        })
    }

    /// Every stored definition, normalized, active or not
    ///
    /// # Errors
    ///
    /// Read errors from the host, and `Configuration` for a stored payload
    /// that no longer normalizes.
    pub fn stored_definitions(&self) -> Result<Vec<RollupDefinition>> {
        let resolver = self.resolver();
        let source: &dyn DefinitionSource = &*self.host;
        let raws = self.host.load_definitions()?;
        Ok(raws
            .iter()
            .map(|raw| resolver.normalize(raw, Some(source)))
            .collect::<std::result::Result<Vec<_>, _>>()?)
    }
}

/// Drop JSON objects that are not child collections
fn strip_relationship_fields(raw: RawDefinition) -> RawDefinition {
    raw.into_iter()
        .filter(|(_, value)| match value {
            Value::Object(obj) => obj.contains_key("records"),
            _ => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_keeps_collections_and_scalars() {
        let raw = json!({
            "Id": "r1",
            "CreatedBy": {"Id": "u1", "Name": "Admin"},
            "orderBys": {"totalSize": 0, "done": true, "records": []},
            "limit": 3
        });
        let stripped = strip_relationship_fields(raw.as_object().unwrap().clone());
        assert!(stripped.contains_key("Id"));
        assert!(stripped.contains_key("orderBys"));
        assert!(stripped.contains_key("limit"));
        assert!(!stripped.contains_key("CreatedBy"));
    }
}
