//! Metadata Resolver
//!
//! Two steps, both run before any record is read:
//! 1. `normalize_definition` turns a raw (possibly namespaced) payload into
//!    a [`RollupDefinition`] with defaults filled in.
//! 2. [`MetadataResolver::resolve`] validates it against the host schema and
//!    builds the field accessor tables the planner and evaluator use.

use serde_json::{Map, Value};

use super::namespace::{
    FieldNameMap, KEY_ACTIVE, KEY_CALC_ITEM_TYPE, KEY_CONCAT_DELIMITER, KEY_COUNT_NULLS, KEY_FILTER,
    KEY_GRANDPARENT_PATH, KEY_ID, KEY_LABEL, KEY_LIMIT, KEY_LOOKUP_ON_CALC_ITEM, KEY_LOOKUP_ON_PARENT,
    KEY_OPERATION, KEY_ORDER_BYS, KEY_ORDER_DIRECTION, KEY_ORDER_FIELD, KEY_ORDER_NULLS,
    KEY_ORDER_RANKING, KEY_PARENT_TYPE, KEY_SOURCE_FIELD, KEY_SPLIT_ON_SOURCE, KEY_TARGET_FIELD,
};
use crate::config::EngineConfig;
use crate::errors::{Result, RollupError};
use crate::filter::Filter;
use crate::host::DefinitionSource;
use crate::model::{
    FieldDescriptor, FieldFamily, NullOrdering, ObjectSchema, Operation, OrderBy, RollupDefinition,
    SchemaRegistry, SortDirection,
};
use crate::relationship::{resolve_field, resolve_path, FieldRef, RelationshipPath};

/// A definition as it arrives from the host or a transport payload
pub type RawDefinition = Map<String, Value>;

/// An order-by child record as it arrives from the host
pub type RawOrderBy = Map<String, Value>;

/// Order-by children embedded in a raw definition
#[derive(Debug, Clone, PartialEq)]
pub enum OrderByChildren {
    Loaded(Vec<RawOrderBy>),
    /// Key absent or `done: false`; must be fetched separately
    NotLoaded,
}

/// Read the order-by collection (`{totalSize, done, records}` or a bare array)
pub fn order_by_children(raw: &RawDefinition, names: &FieldNameMap) -> OrderByChildren {
    let records = |v: &Value| -> Vec<RawOrderBy> {
        v.as_array()
            .map(|a| a.iter().filter_map(|r| r.as_object().cloned()).collect())
            .unwrap_or_default()
    };
    match names.get(raw, KEY_ORDER_BYS) {
        None | Some(Value::Null) => OrderByChildren::NotLoaded,
        Some(v @ Value::Array(_)) => OrderByChildren::Loaded(records(v)),
        Some(Value::Object(collection)) => {
            let done = collection.get("done").and_then(Value::as_bool).unwrap_or(true);
            if !done {
                return OrderByChildren::NotLoaded;
            }
            OrderByChildren::Loaded(collection.get("records").map(records).unwrap_or_default())
        }
        Some(_) => OrderByChildren::Loaded(Vec::new()),
    }
}

fn string_value(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn bool_value(v: Option<&Value>, default: bool) -> bool {
    match v {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            _ => default,
        },
        Some(Value::Number(n)) => n.as_i64().map(|i| i != 0).unwrap_or(default),
        _ => default,
    }
}

fn definition_name(raw: &RawDefinition, names: &FieldNameMap) -> String {
    names
        .get(raw, KEY_ID)
        .or_else(|| names.get(raw, KEY_LABEL))
        .and_then(string_value)
        .unwrap_or_else(|| "<unnamed>".to_string())
}

fn parse_order_by(raw: &RawOrderBy, names: &FieldNameMap, position: usize, definition: &str) -> Result<OrderBy> {
    let unusable = |field: &str, reason: String| RollupError::UnusableOrderBy {
        definition: definition.to_string(),
        field: field.to_string(),
        reason,
    };

    let field = names
        .get(raw, KEY_ORDER_FIELD)
        .and_then(string_value)
        .ok_or_else(|| unusable("<missing>", "order-by has no field name".to_string()))?;

    let direction = match names.get(raw, KEY_ORDER_DIRECTION).and_then(string_value) {
        None => SortDirection::Ascending,
        Some(s) => s
            .parse::<SortDirection>()
            .map_err(|_| unusable(&field, format!("unknown sort order '{}'", s)))?,
    };

    let nulls = match names.get(raw, KEY_ORDER_NULLS).and_then(string_value) {
        None => NullOrdering::default_for(direction),
        Some(s) => s
            .parse::<NullOrdering>()
            .map_err(|_| unusable(&field, format!("unknown null sort order '{}'", s)))?,
    };

    let ranking = match names.get(raw, KEY_ORDER_RANKING) {
        None | Some(Value::Null) => position as u32,
        Some(v) => v
            .as_u64()
            .or_else(|| v.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
            .map(|r| r as u32)
            .ok_or_else(|| unusable(&field, format!("invalid ranking {}", v)))?,
    };

    Ok(OrderBy {
        field,
        direction,
        nulls,
        ranking,
    })
}

/// Turn a raw payload into a normalized definition
///
/// Order-by children that were not loaded are fetched from `source` when the
/// definition has an id.
///
/// # Errors
///
/// Returns a configuration error for missing required keys, unknown
/// operations, non-positive limits and malformed order-bys.
pub fn normalize_definition(
    raw: &RawDefinition,
    names: &FieldNameMap,
    source: Option<&dyn DefinitionSource>,
) -> Result<RollupDefinition> {
    let name = definition_name(raw, names);
    let required = |key: &str| -> Result<String> {
        names
            .get(raw, key)
            .and_then(string_value)
            .ok_or_else(|| RollupError::MissingField {
                definition: name.clone(),
                field: names.effective(key).to_string(),
            })
    };
    let optional = |key: &str| names.get(raw, key).and_then(string_value);

    let operation_text = required(KEY_OPERATION)?;
    let operation = operation_text
        .parse::<Operation>()
        .map_err(|_| RollupError::UnknownOperation {
            definition: name.clone(),
            operation: operation_text.clone(),
        })?;

    let limit = match names.get(raw, KEY_LIMIT) {
        None | Some(Value::Null) => None,
        Some(v) => {
            let n = v
                .as_i64()
                .or_else(|| v.as_f64().map(|f| f as i64))
                .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
                .ok_or_else(|| RollupError::InvalidDefinition {
                    reason: format!("definition {}: limit {} is not a number", name, v),
                })?;
            if n <= 0 {
                return Err(RollupError::InvalidLimit {
                    definition: name.clone(),
                    limit: n,
                });
            }
            Some(u32::try_from(n).unwrap_or(u32::MAX))
        }
    };

    let id = optional(KEY_ID);
    let children = match order_by_children(raw, names) {
        OrderByChildren::Loaded(records) => records,
        OrderByChildren::NotLoaded => match (&id, source) {
            (Some(id), Some(source)) => source.find_order_bys(id)?,
            _ => Vec::new(),
        },
    };
    let mut order_bys = children
        .iter()
        .enumerate()
        .map(|(i, r)| parse_order_by(r, names, i, &name))
        .collect::<Result<Vec<_>>>()?;
    order_bys.sort_by_key(|o| o.ranking);

    // delimiter keeps surrounding whitespace (", ")
    let concat_delimiter = names
        .get(raw, KEY_CONCAT_DELIMITER)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(RollupDefinition {
        id,
        label: optional(KEY_LABEL),
        calc_item_type: required(KEY_CALC_ITEM_TYPE)?,
        lookup_field_on_calc_item: required(KEY_LOOKUP_ON_CALC_ITEM)?,
        lookup_field_on_parent: required(KEY_LOOKUP_ON_PARENT)?,
        parent_type: required(KEY_PARENT_TYPE)?,
        source_field: required(KEY_SOURCE_FIELD)?,
        target_field: required(KEY_TARGET_FIELD)?,
        operation,
        filter: optional(KEY_FILTER),
        concat_delimiter,
        split_delimiter_on_source: bool_value(names.get(raw, KEY_SPLIT_ON_SOURCE), false),
        limit,
        grandparent_path: optional(KEY_GRANDPARENT_PATH),
        order_bys,
        count_nulls: bool_value(names.get(raw, KEY_COUNT_NULLS), false),
        active: bool_value(names.get(raw, KEY_ACTIVE), true),
    })
}

/// Inverse of `normalize_definition`, using effective keys
///
/// Order-bys are written as a complete child collection so the receiving
/// side can tell "no order-bys" from "not loaded".
pub fn to_raw_definition(def: &RollupDefinition, names: &FieldNameMap) -> RawDefinition {
    let mut raw = Map::new();
    let mut put = |key: &str, value: Value| {
        raw.insert(names.effective(key).to_string(), value);
    };
    if let Some(id) = &def.id {
        put(KEY_ID, Value::from(id.clone()));
    }
    if let Some(label) = &def.label {
        put(KEY_LABEL, Value::from(label.clone()));
    }
    put(KEY_CALC_ITEM_TYPE, Value::from(def.calc_item_type.clone()));
    put(KEY_LOOKUP_ON_CALC_ITEM, Value::from(def.lookup_field_on_calc_item.clone()));
    put(KEY_LOOKUP_ON_PARENT, Value::from(def.lookup_field_on_parent.clone()));
    put(KEY_PARENT_TYPE, Value::from(def.parent_type.clone()));
    put(KEY_SOURCE_FIELD, Value::from(def.source_field.clone()));
    put(KEY_TARGET_FIELD, Value::from(def.target_field.clone()));
    put(KEY_OPERATION, Value::from(def.operation.as_str()));
    if let Some(filter) = &def.filter {
        put(KEY_FILTER, Value::from(filter.clone()));
    }
    put(KEY_CONCAT_DELIMITER, Value::from(def.concat_delimiter.clone()));
    put(KEY_SPLIT_ON_SOURCE, Value::from(def.split_delimiter_on_source));
    if let Some(limit) = def.limit {
        put(KEY_LIMIT, Value::from(limit));
    }
    if let Some(path) = &def.grandparent_path {
        put(KEY_GRANDPARENT_PATH, Value::from(path.clone()));
    }
    put(KEY_COUNT_NULLS, Value::from(def.count_nulls));
    put(KEY_ACTIVE, Value::from(def.active));

    let records: Vec<Value> = def
        .order_bys
        .iter()
        .map(|o| {
            let mut r = Map::new();
            r.insert(names.effective(KEY_ORDER_FIELD).to_string(), Value::from(o.field.clone()));
            r.insert(
                names.effective(KEY_ORDER_DIRECTION).to_string(),
                Value::from(match o.direction {
                    SortDirection::Ascending => "ASC",
                    SortDirection::Descending => "DESC",
                }),
            );
            r.insert(
                names.effective(KEY_ORDER_NULLS).to_string(),
                Value::from(match o.nulls {
                    NullOrdering::First => "NULLS FIRST",
                    NullOrdering::Last => "NULLS LAST",
                }),
            );
            r.insert(names.effective(KEY_ORDER_RANKING).to_string(), Value::from(o.ranking));
            Value::Object(r)
        })
        .collect();
    put(
        KEY_ORDER_BYS,
        serde_json::json!({ "totalSize": records.len(), "done": true, "records": records }),
    );
    raw
}

/// Order-by criterion bound to a field accessor
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOrderBy {
    pub order_by: OrderBy,
    pub field: FieldRef,
}

/// A definition validated against the schema, with accessor tables
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDefinition {
    pub definition: RollupDefinition,
    pub key: String,
    /// Lookup on the calculation item naming its direct parent
    pub calc_lookup: FieldRef,
    /// Yields the parent key of a calculation item
    pub group_key: FieldRef,
    /// Field on the parent type matched against group keys
    pub parent_match_field: FieldDescriptor,
    pub grandparent: Option<RelationshipPath>,
    pub source: FieldRef,
    pub target: FieldDescriptor,
    pub filter: Option<Filter>,
    pub order_bys: Vec<ResolvedOrderBy>,
    /// Order-dependent operation with no order-bys; fetch order decides
    pub fetch_order_fallback: bool,
}

impl ResolvedDefinition {
    pub fn operation(&self) -> Operation {
        self.definition.operation
    }

    pub fn parent_type(&self) -> &str {
        &self.definition.parent_type
    }

    pub fn calc_item_type(&self) -> &str {
        &self.definition.calc_item_type
    }

    /// Every accessor the planner must be able to read for an item
    pub fn item_fields(&self) -> Vec<&FieldRef> {
        let mut fields = vec![&self.group_key, &self.source];
        fields.extend(self.order_bys.iter().map(|o| &o.field));
        if let Some(filter) = &self.filter {
            fields.extend(filter.field_refs());
        }
        fields
    }
}

/// Validates normalized definitions against the host schema
pub struct MetadataResolver<'a> {
    schema: &'a SchemaRegistry,
    names: FieldNameMap,
    require_explicit_order_by: bool,
    max_definitions: usize,
}

impl<'a> MetadataResolver<'a> {
    pub fn new(schema: &'a SchemaRegistry, config: &EngineConfig) -> Self {
        Self {
            schema,
            names: FieldNameMap::new(&config.namespace),
            require_explicit_order_by: config.require_explicit_order_by,
            max_definitions: config.max_definitions_per_request,
        }
    }

    pub fn field_names(&self) -> &FieldNameMap {
        &self.names
    }

    pub fn normalize(&self, raw: &RawDefinition, source: Option<&dyn DefinitionSource>) -> Result<RollupDefinition> {
        normalize_definition(raw, &self.names, source)
    }

    /// Parse a string-encoded payload: a JSON array of raw definitions
    ///
    /// An object with a `definitions` array is accepted as well.
    pub fn normalize_payload(&self, payload: &str, source: Option<&dyn DefinitionSource>) -> Result<Vec<RollupDefinition>> {
        let value: Value = serde_json::from_str(payload)?;
        let items = match value {
            Value::Array(items) => items,
            Value::Object(mut obj) => match obj.remove("definitions") {
                Some(Value::Array(items)) => items,
                _ => vec![Value::Object(obj)],
            },
            _ => {
                return Err(RollupError::InvalidDefinition {
                    reason: "payload must be a JSON array of definitions".to_string(),
                })
            }
        };
        items
            .iter()
            .map(|item| match item {
                Value::Object(raw) => self.normalize(raw, source),
                Value::String(nested) => serde_json::from_str::<RawDefinition>(nested)
                    .map_err(RollupError::from)
                    .and_then(|raw| self.normalize(&raw, source)),
                other => Err(RollupError::InvalidDefinition {
                    reason: format!("payload entry is not an object: {}", other),
                }),
            })
            .collect()
    }

    fn object(&self, def: &RollupDefinition, name: &str) -> Result<&'a ObjectSchema> {
        self.schema.get(name).ok_or_else(|| RollupError::UnknownObjectType {
            definition: def.display_name(),
            object_type: name.to_string(),
        })
    }

    fn field(&self, def: &RollupDefinition, object: &ObjectSchema, name: &str) -> Result<FieldDescriptor> {
        object.field(name).cloned().ok_or_else(|| RollupError::UnknownField {
            definition: def.display_name(),
            object_type: object.name.clone(),
            field: name.to_string(),
        })
    }

    fn calc_field(&self, def: &RollupDefinition, calc: &ObjectSchema, name: &str) -> Result<FieldRef> {
        let field = if name.contains('.') {
            resolve_field(self.schema, &calc.name, name)?
        } else {
            FieldRef::direct(calc.name.clone(), self.field(def, calc, name)?)
        };
        if !field.field.readable {
            return Err(RollupError::FieldNotReadable {
                definition: def.display_name(),
                object_type: field.owner_type().to_string(),
                field: field.field.name.clone(),
            });
        }
        Ok(field)
    }

    /// Validate one definition and build its accessor tables
    ///
    /// # Errors
    ///
    /// Configuration, path and filter errors; nothing is read from the host.
    pub fn resolve(&self, def: &RollupDefinition) -> Result<ResolvedDefinition> {
        let name = def.display_name();
        if def.limit == Some(0) {
            return Err(RollupError::InvalidLimit {
                definition: name,
                limit: 0,
            });
        }

        let calc = self.object(def, &def.calc_item_type)?;
        let parent = self.object(def, &def.parent_type)?;

        let calc_lookup = self.calc_field(def, calc, &def.lookup_field_on_calc_item)?;
        let source = self.calc_field(def, calc, &def.source_field)?;

        let target = self.field(def, parent, &def.target_field)?;
        if !target.updateable {
            return Err(RollupError::TargetNotUpdateable {
                definition: name,
                object_type: parent.name.clone(),
                field: target.name,
            });
        }
        check_compatibility(def, &source, &target)?;

        let grandparent = match &def.grandparent_path {
            Some(path) => {
                let resolved = resolve_path(self.schema, &calc.name, path)?;
                if !resolved.final_type().eq_ignore_ascii_case(&parent.name) {
                    return Err(RollupError::PathResolution {
                        path: path.clone(),
                        hop: resolved.target.field.name.clone(),
                        reason: format!(
                            "path ends on {}, expected parent type {}",
                            resolved.final_type(),
                            parent.name
                        ),
                    });
                }
                if resolved.hops().is_empty() {
                    return Err(RollupError::PathResolution {
                        path: path.clone(),
                        hop: path.clone(),
                        reason: "grandparent path needs at least one relationship hop".to_string(),
                    });
                }
                Some(resolved)
            }
            None => None,
        };

        let (group_key, parent_match_field) = match &grandparent {
            Some(path) => (path.key_ref(), self.field(def, parent, "Id")?),
            None => (calc_lookup.clone(), self.field(def, parent, &def.lookup_field_on_parent)?),
        };

        let filter = match &def.filter {
            Some(f) => Filter::compile(f, self.schema, &calc.name)?,
            None => None,
        };

        let order_bys = def
            .order_bys
            .iter()
            .map(|o| {
                let field = resolve_field(self.schema, &calc.name, &o.field).map_err(|e| {
                    RollupError::UnusableOrderBy {
                        definition: def.display_name(),
                        field: o.field.clone(),
                        reason: e.to_string(),
                    }
                })?;
                if !field.field.readable {
                    return Err(RollupError::UnusableOrderBy {
                        definition: def.display_name(),
                        field: o.field.clone(),
                        reason: "field is not readable".to_string(),
                    });
                }
                Ok(ResolvedOrderBy {
                    order_by: o.clone(),
                    field,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let fetch_order_fallback = def.operation.is_order_dependent() && order_bys.is_empty();
        if fetch_order_fallback {
            if self.require_explicit_order_by {
                return Err(RollupError::MissingOrderBy {
                    definition: def.display_name(),
                    operation: def.operation.to_string(),
                });
            }
            tracing::warn!(
                definition = %def.display_name(),
                operation = %def.operation,
                "no order-by criteria; falling back to host fetch order, which is not portable"
            );
        }

        Ok(ResolvedDefinition {
            definition: def.clone(),
            key: def.key(),
            calc_lookup,
            group_key,
            parent_match_field,
            grandparent,
            source,
            target,
            filter,
            order_bys,
            fetch_order_fallback,
        })
    }

    /// Resolve a request's worth of definitions, all or nothing
    pub fn resolve_all(&self, defs: &[RollupDefinition]) -> Result<Vec<ResolvedDefinition>> {
        if defs.len() > self.max_definitions {
            return Err(RollupError::TooManyDefinitions {
                count: defs.len(),
                max: self.max_definitions,
            });
        }
        defs.iter().map(|d| self.resolve(d)).collect()
    }
}

fn check_compatibility(def: &RollupDefinition, source: &FieldRef, target: &FieldDescriptor) -> Result<()> {
    let source_family = source.field_type().family();
    let target_family = target.field_type.family();
    let incompatible = |field: &str, field_type: String, reason: &str| RollupError::IncompatibleField {
        definition: def.display_name(),
        field: field.to_string(),
        field_type,
        operation: def.operation.to_string(),
        reason: reason.to_string(),
    };
    let source_err = |reason: &str| incompatible(&source.path(), source.field_type().to_string(), reason);
    let target_err = |reason: &str| incompatible(&target.name, target.field_type.to_string(), reason);

    match def.operation {
        Operation::Sum | Operation::Average => {
            if source_family != FieldFamily::Numeric {
                return Err(source_err("source must be numeric"));
            }
            if target_family != FieldFamily::Numeric {
                return Err(target_err("target must be numeric"));
            }
        }
        Operation::Count => {
            if target_family != FieldFamily::Numeric {
                return Err(target_err("target must be numeric"));
            }
        }
        Operation::Min | Operation::Max => {
            if source_family == FieldFamily::Boolean {
                return Err(source_err("source must be numeric, temporal or text"));
            }
            if target_family != source_family && target_family != FieldFamily::Text {
                return Err(target_err("target must match the source type or be text"));
            }
        }
        Operation::Concat | Operation::ConcatDistinct => {
            if source_family != FieldFamily::Text {
                return Err(source_err("source must be text"));
            }
            if target_family != FieldFamily::Text {
                return Err(target_err("target must be text"));
            }
        }
        Operation::First | Operation::Last | Operation::Most | Operation::Least => {
            if target_family != source_family && target_family != FieldFamily::Text {
                return Err(target_err("target must match the source type or be text"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldType, ObjectSchema};
    use serde_json::json;

    fn schema() -> SchemaRegistry {
        SchemaRegistry::new()
            .with_object(
                ObjectSchema::new("Contact")
                    .with_field(FieldDescriptor::new("FirstName", FieldType::Text))
                    .with_field(FieldDescriptor::new("Score", FieldType::Number))
                    .with_field(FieldDescriptor::new("Ssn", FieldType::Text).unreadable())
                    .with_field(FieldDescriptor::reference("AccountId", "Account", "Account")),
            )
            .with_object(
                ObjectSchema::new("Account")
                    .with_field(FieldDescriptor::new("Names", FieldType::LongText))
                    .with_field(FieldDescriptor::new("Total", FieldType::Number).with_scale(2))
                    .with_field(FieldDescriptor::new("Formula", FieldType::Number).read_only()),
            )
    }

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    fn raw(value: Value) -> RawDefinition {
        value.as_object().cloned().unwrap()
    }

    fn concat_names() -> Value {
        json!({
            "id": "r1",
            "calcItemType": "Contact",
            "lookupFieldOnCalcItem": "AccountId",
            "lookupFieldOnParent": "Id",
            "parentType": "Account",
            "sourceField": "FirstName",
            "targetField": "Names",
            "operation": "concat",
            "concatDelimiter": ", ",
            "orderBys": {"totalSize": 0, "done": true, "records": []}
        })
    }

    #[test]
    fn test_normalize_fills_defaults() {
        let names = FieldNameMap::new("");
        let def = normalize_definition(&raw(concat_names()), &names, None).unwrap();
        assert_eq!(def.operation, Operation::Concat);
        assert_eq!(def.concat_delimiter, ", ");
        assert!(def.filter.is_none());
        assert!(def.limit.is_none());
        assert!(def.active);
        assert!(def.order_bys.is_empty());
    }

    #[test]
    fn test_normalize_reads_namespaced_keys() {
        let names = FieldNameMap::new("acme__");
        let mut value = concat_names();
        let obj = value.as_object_mut().unwrap();
        let op = obj.remove("operation").unwrap();
        obj.insert("acme__operation".to_string(), op);
        let def = normalize_definition(&raw(value), &names, None).unwrap();
        assert_eq!(def.operation, Operation::Concat);
    }

    #[test]
    fn test_unknown_operation() {
        let mut value = concat_names();
        value["operation"] = json!("MEDIAN");
        let err = normalize_definition(&raw(value), &FieldNameMap::new(""), None).unwrap_err();
        assert!(matches!(err, RollupError::UnknownOperation { .. }));
    }

    #[test]
    fn test_missing_required_key_names_effective_key() {
        let mut value = concat_names();
        value.as_object_mut().unwrap().remove("sourceField");
        let err = normalize_definition(&raw(value), &FieldNameMap::new("acme__"), None).unwrap_err();
        match err {
            RollupError::MissingField { field, .. } => assert_eq!(field, "acme__sourceField"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_non_positive_limit_rejected() {
        let mut value = concat_names();
        value["limit"] = json!(0);
        let err = normalize_definition(&raw(value), &FieldNameMap::new(""), None).unwrap_err();
        assert!(matches!(err, RollupError::InvalidLimit { limit: 0, .. }));
    }

    #[test]
    fn test_order_bys_sorted_and_defaulted() {
        let mut value = concat_names();
        value["orderBys"] = json!([
            {"fieldName": "Score", "sortOrder": "DESC", "ranking": 2},
            {"fieldName": "FirstName", "ranking": 1, "nullSortOrder": "NULLS LAST"}
        ]);
        let def = normalize_definition(&raw(value), &FieldNameMap::new(""), None).unwrap();
        assert_eq!(def.order_bys[0].field, "FirstName");
        assert_eq!(def.order_bys[0].nulls, NullOrdering::Last);
        assert_eq!(def.order_bys[1].direction, SortDirection::Descending);
        assert_eq!(def.order_bys[1].nulls, NullOrdering::Last);
    }

    #[test]
    fn test_not_loaded_children_distinguished_from_empty() {
        let names = FieldNameMap::new("");
        let mut value = concat_names();
        value["orderBys"] = json!({"totalSize": 2, "done": false, "records": []});
        assert_eq!(order_by_children(&raw(value.clone()), &names), OrderByChildren::NotLoaded);
        value.as_object_mut().unwrap().remove("orderBys");
        assert_eq!(order_by_children(&raw(value), &names), OrderByChildren::NotLoaded);
        assert_eq!(
            order_by_children(&raw(concat_names()), &names),
            OrderByChildren::Loaded(Vec::new())
        );
    }

    #[test]
    fn test_raw_roundtrip() {
        let names = FieldNameMap::new("acme__");
        let def = RollupDefinition::new("Contact", "AccountId", "Account", "Id", "Score", "Total", Operation::Sum)
            .with_id("r9")
            .with_filter("Score > 1")
            .with_limit(5)
            .with_order_by(OrderBy::desc("Score"));
        let raw = to_raw_definition(&def, &names);
        assert!(raw.contains_key("acme__operation"));
        assert!(raw.contains_key("id"));
        assert_eq!(normalize_definition(&raw, &names, None).unwrap(), def);
    }

    #[test]
    fn test_resolve_valid_definition() {
        let def = RollupDefinition::new("Contact", "AccountId", "Account", "Id", "FirstName", "Names", Operation::Concat);
        let resolved = MetadataResolver::new(&schema(), &config()).resolve(&def).unwrap();
        assert_eq!(resolved.group_key.field.name, "AccountId");
        assert_eq!(resolved.parent_match_field.name, "Id");
        assert!(!resolved.fetch_order_fallback);
    }

    #[test]
    fn test_resolve_rejects_incompatible_types() {
        let def = RollupDefinition::new("Contact", "AccountId", "Account", "Id", "FirstName", "Total", Operation::Sum);
        let err = MetadataResolver::new(&schema(), &config()).resolve(&def).unwrap_err();
        assert!(matches!(err, RollupError::IncompatibleField { .. }));

        let def = RollupDefinition::new("Contact", "AccountId", "Account", "Id", "Score", "Total", Operation::Concat);
        let err = MetadataResolver::new(&schema(), &config()).resolve(&def).unwrap_err();
        assert!(err.to_string().contains("source must be text"));
    }

    #[test]
    fn test_resolve_respects_field_permissions() {
        let resolver_schema = schema();
        let resolver = MetadataResolver::new(&resolver_schema, &config());
        let def = RollupDefinition::new("Contact", "AccountId", "Account", "Id", "Score", "Formula", Operation::Sum);
        assert!(matches!(resolver.resolve(&def).unwrap_err(), RollupError::TargetNotUpdateable { .. }));

        let def = RollupDefinition::new("Contact", "AccountId", "Account", "Id", "Ssn", "Names", Operation::Concat);
        assert!(matches!(resolver.resolve(&def).unwrap_err(), RollupError::FieldNotReadable { .. }));
    }

    #[test]
    fn test_first_without_order_by() {
        let schema = schema();
        let def = RollupDefinition::new("Contact", "AccountId", "Account", "Id", "FirstName", "Names", Operation::First);
        let resolved = MetadataResolver::new(&schema, &config()).resolve(&def).unwrap();
        assert!(resolved.fetch_order_fallback);

        let strict = EngineConfig {
            require_explicit_order_by: true,
            ..config()
        };
        let err = MetadataResolver::new(&schema, &strict).resolve(&def).unwrap_err();
        assert!(matches!(err, RollupError::MissingOrderBy { .. }));
    }

    #[test]
    fn test_unusable_order_by_always_rejected() {
        let def = RollupDefinition::new("Contact", "AccountId", "Account", "Id", "FirstName", "Names", Operation::Last)
            .with_order_by(OrderBy::asc("Birthday"));
        let err = MetadataResolver::new(&schema(), &config()).resolve(&def).unwrap_err();
        assert!(matches!(err, RollupError::UnusableOrderBy { .. }));
    }

    #[test]
    fn test_too_many_definitions() {
        let small = EngineConfig {
            max_definitions_per_request: 1,
            ..config()
        };
        let def = RollupDefinition::new("Contact", "AccountId", "Account", "Id", "FirstName", "Names", Operation::Concat);
        let schema = schema();
        let err = MetadataResolver::new(&schema, &small)
            .resolve_all(&[def.clone(), def])
            .unwrap_err();
        assert!(matches!(err, RollupError::TooManyDefinitions { count: 2, max: 1 }));
    }

    #[test]
    fn test_payload_accepts_string_entries() {
        let schema = schema();
        let resolver = MetadataResolver::new(&schema, &config());
        let payload = serde_json::to_string(&json!([concat_names().to_string()])).unwrap();
        let defs = resolver.normalize_payload(&payload, None).unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].id.as_deref(), Some("r1"));
    }
}
