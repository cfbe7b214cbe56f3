use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::schema::ObjectSchema;
use super::value::FieldValue;
use crate::errors::{Result, RollupError};

static NULL: FieldValue = FieldValue::Null;

/// A host record: calculation item or parent aggregate
///
/// The `Id` field is always present in `fields` and mirrors `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub object_type: String,
    pub id: String,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new(object_type: impl Into<String>, id: impl Into<String>) -> Self {
        let id = id.into();
        let mut fields = BTreeMap::new();
        fields.insert("Id".to_string(), FieldValue::Text(id.clone()));
        Self {
            object_type: object_type.into(),
            id,
            fields,
        }
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Field value; exact name first, then case-insensitive, else Null
    pub fn get(&self, field: &str) -> &FieldValue {
        self.fields
            .get(field)
            .or_else(|| {
                self.fields
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(field))
                    .map(|(_, v)| v)
            })
            .unwrap_or(&NULL)
    }

    /// Build from a flat JSON object; the id is read from `Id` (or `id`)
    ///
    /// # Errors
    ///
    /// Returns `RollupError::Serialization` when the id is missing or not a
    /// string.
    pub fn from_json(
        object_type: impl Into<String>,
        object: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self> {
        let object_type = object_type.into();
        let id = object
            .get("Id")
            .or_else(|| object.get("id"))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| RollupError::Serialization {
                message: format!("{} record without a string Id", object_type),
            })?
            .to_string();
        let mut record = Record::new(object_type, id);
        for (key, value) in object {
            if key == "id" {
                continue;
            }
            record.fields.insert(key, FieldValue::from(value));
        }
        Ok(record)
    }

    /// Flat JSON object form (inverse of `from_json`)
    pub fn to_json(&self) -> serde_json::Map<String, serde_json::Value> {
        self.fields
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::from(v.clone())))
            .collect()
    }

    /// Coerce every described field to its declared type
    pub fn coerce_with(mut self, schema: &ObjectSchema) -> Self {
        for (name, value) in self.fields.iter_mut() {
            if let Some(descriptor) = schema.field(name) {
                *value = value.coerce(descriptor.field_type);
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::schema::{FieldDescriptor, FieldType};
    use chrono::NaiveDate;

    #[test]
    fn test_missing_field_reads_as_null() {
        let r = Record::new("Contact", "c1").with("FirstName", "Ada");
        assert_eq!(r.get("FirstName"), &FieldValue::text("Ada"));
        assert_eq!(r.get("firstname"), &FieldValue::text("Ada"));
        assert!(r.get("LastName").is_null());
        assert_eq!(r.get("Id"), &FieldValue::text("c1"));
    }

    #[test]
    fn test_from_json_requires_id() {
        let obj = serde_json::json!({"Name": "x"});
        let err = Record::from_json("Account", obj.as_object().unwrap().clone()).unwrap_err();
        assert!(matches!(err, RollupError::Serialization { .. }));
    }

    #[test]
    fn test_coerce_with_schema() {
        let schema = ObjectSchema::new("Opportunity")
            .with_field(FieldDescriptor::new("CloseDate", FieldType::Date))
            .with_field(FieldDescriptor::new("Amount", FieldType::Currency));
        let obj = serde_json::json!({"Id": "o1", "CloseDate": "2024-01-31", "Amount": "10.5"});
        let r = Record::from_json("Opportunity", obj.as_object().unwrap().clone())
            .unwrap()
            .coerce_with(&schema);
        assert_eq!(
            r.get("CloseDate"),
            &FieldValue::Date(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap())
        );
        assert_eq!(r.get("Amount").as_text().as_deref(), Some("10.5"));
    }
}
