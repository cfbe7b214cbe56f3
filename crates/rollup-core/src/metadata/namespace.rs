//! Namespace-aware field identifiers for definition payloads
//!
//! When the engine ships inside a namespaced package, custom keys in
//! definition payloads carry the namespace prefix (`acme__calcItemType`).
//! The mapping from logical to effective key is computed once per
//! namespace and used for every read and write of a payload.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Logical object name of definition records
pub const DEFINITION_OBJECT: &str = "RollupDefinition";

pub const KEY_ID: &str = "id";
pub const KEY_LABEL: &str = "label";
pub const KEY_CALC_ITEM_TYPE: &str = "calcItemType";
pub const KEY_LOOKUP_ON_CALC_ITEM: &str = "lookupFieldOnCalcItem";
pub const KEY_LOOKUP_ON_PARENT: &str = "lookupFieldOnParent";
pub const KEY_PARENT_TYPE: &str = "parentType";
pub const KEY_SOURCE_FIELD: &str = "sourceField";
pub const KEY_TARGET_FIELD: &str = "targetField";
pub const KEY_OPERATION: &str = "operation";
pub const KEY_FILTER: &str = "filter";
pub const KEY_CONCAT_DELIMITER: &str = "concatDelimiter";
pub const KEY_SPLIT_ON_SOURCE: &str = "splitDelimiterOnSource";
pub const KEY_LIMIT: &str = "limit";
pub const KEY_GRANDPARENT_PATH: &str = "grandparentPath";
pub const KEY_ORDER_BYS: &str = "orderBys";
pub const KEY_COUNT_NULLS: &str = "countNulls";
pub const KEY_ACTIVE: &str = "active";

pub const KEY_ORDER_FIELD: &str = "fieldName";
pub const KEY_ORDER_DIRECTION: &str = "sortOrder";
pub const KEY_ORDER_NULLS: &str = "nullSortOrder";
pub const KEY_ORDER_RANKING: &str = "ranking";

/// Keys owned by the host platform; never prefixed
const STANDARD_KEYS: [&str; 2] = [KEY_ID, KEY_LABEL];

const CUSTOM_KEYS: [&str; 19] = [
    KEY_CALC_ITEM_TYPE,
    KEY_LOOKUP_ON_CALC_ITEM,
    KEY_LOOKUP_ON_PARENT,
    KEY_PARENT_TYPE,
    KEY_SOURCE_FIELD,
    KEY_TARGET_FIELD,
    KEY_OPERATION,
    KEY_FILTER,
    KEY_CONCAT_DELIMITER,
    KEY_SPLIT_ON_SOURCE,
    KEY_LIMIT,
    KEY_GRANDPARENT_PATH,
    KEY_ORDER_BYS,
    KEY_COUNT_NULLS,
    KEY_ACTIVE,
    KEY_ORDER_FIELD,
    KEY_ORDER_DIRECTION,
    KEY_ORDER_NULLS,
    KEY_ORDER_RANKING,
];

/// What callers need to build namespace-safe payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceInfo {
    pub namespace: String,
    pub safe_object_name: String,
    pub safe_operation_field: String,
}

/// Logical → effective key mapping for one namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldNameMap {
    namespace: String,
    effective: BTreeMap<&'static str, String>,
}

impl FieldNameMap {
    pub fn new(namespace: &str) -> Self {
        let namespace = namespace.trim().to_string();
        let effective = STANDARD_KEYS
            .iter()
            .map(|k| (*k, k.to_string()))
            .chain(CUSTOM_KEYS.iter().map(|k| (*k, format!("{}{}", namespace, k))))
            .collect();
        Self { namespace, effective }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Effective key for a logical key; unknown keys pass through unchanged
    pub fn effective<'a>(&'a self, logical: &'a str) -> &'a str {
        self.effective.get(logical).map(String::as_str).unwrap_or(logical)
    }

    /// Read a logical key, accepting either the effective or the bare form
    pub fn get<'v>(
        &self,
        raw: &'v serde_json::Map<String, serde_json::Value>,
        logical: &str,
    ) -> Option<&'v serde_json::Value> {
        raw.get(self.effective(logical)).or_else(|| raw.get(logical))
    }

    /// Whether `key` is (effectively or logically) a known definition key
    pub fn is_known(&self, key: &str) -> bool {
        self.effective.iter().any(|(logical, eff)| key == *logical || key == eff)
    }

    pub fn info(&self) -> NamespaceInfo {
        NamespaceInfo {
            namespace: self.namespace.clone(),
            safe_object_name: format!("{}{}", self.namespace, DEFINITION_OBJECT),
            safe_operation_field: self.effective(KEY_OPERATION).to_string(),
        }
    }
}
