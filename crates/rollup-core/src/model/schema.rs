use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, RollupError};

/// Host field type as reported by the host's describe information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    LongText,
    Picklist,
    Id,
    Reference,
    Number,
    Integer,
    Currency,
    Percent,
    Boolean,
    Date,
    DateTime,
}

/// Coarse grouping of field types used for operation compatibility checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldFamily {
    Text,
    Numeric,
    Boolean,
    Temporal,
}

impl FieldType {
    pub fn family(&self) -> FieldFamily {
        match self {
            FieldType::Text
            | FieldType::LongText
            | FieldType::Picklist
            | FieldType::Id
            | FieldType::Reference => FieldFamily::Text,
            FieldType::Number | FieldType::Integer | FieldType::Currency | FieldType::Percent => {
                FieldFamily::Numeric
            }
            FieldType::Boolean => FieldFamily::Boolean,
            FieldType::Date | FieldType::DateTime => FieldFamily::Temporal,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.family() == FieldFamily::Numeric
    }

    pub fn is_text(&self) -> bool {
        self.family() == FieldFamily::Text
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::LongText => "long_text",
            FieldType::Picklist => "picklist",
            FieldType::Id => "id",
            FieldType::Reference => "reference",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Currency => "currency",
            FieldType::Percent => "percent",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::DateTime => "date_time",
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lookup metadata carried by reference fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// Name used in dotted paths (`Account` for the `AccountId` field)
    pub relationship_name: String,
    /// Object type the reference points at
    pub target_type: String,
    /// Whether the hop resolves to at most one record
    #[serde(default = "default_true")]
    pub to_one: bool,
}

fn default_true() -> bool {
    true
}

/// Describe information for a single field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Decimal places kept when a numeric value is written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
    #[serde(default = "default_true")]
    pub readable: bool,
    #[serde(default = "default_true")]
    pub updateable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<Relationship>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            scale: None,
            readable: true,
            updateable: true,
            relationship: None,
        }
    }

    /// A to-one lookup field (`AccountId` → `Account`)
    pub fn reference(
        name: impl Into<String>,
        relationship_name: impl Into<String>,
        target_type: impl Into<String>,
    ) -> Self {
        let mut field = Self::new(name, FieldType::Reference);
        field.relationship = Some(Relationship {
            relationship_name: relationship_name.into(),
            target_type: target_type.into(),
            to_one: true,
        });
        field
    }

    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn read_only(mut self) -> Self {
        self.updateable = false;
        self
    }

    pub fn unreadable(mut self) -> Self {
        self.readable = false;
        self
    }

    /// The relationship, if this field is a to-one lookup
    pub fn to_one(&self) -> Option<&Relationship> {
        self.relationship.as_ref().filter(|r| r.to_one)
    }
}

/// Describe information for one object type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawObjectSchema")]
pub struct ObjectSchema {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
}

#[derive(Deserialize)]
struct RawObjectSchema {
    name: String,
    #[serde(default)]
    fields: Vec<FieldDescriptor>,
}

impl From<RawObjectSchema> for ObjectSchema {
    fn from(raw: RawObjectSchema) -> Self {
        raw.fields
            .into_iter()
            .fold(ObjectSchema::new(raw.name), |schema, f| schema.with_field(f))
    }
}

impl ObjectSchema {
    /// New schema with only the read-only `Id` field
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: vec![FieldDescriptor::new("Id", FieldType::Id).read_only()],
        }
    }

    /// Add or replace a field
    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
        self
    }

    /// Field by name; exact match first, then case-insensitive
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .or_else(|| self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name)))
    }

    /// Lookup field whose relationship name or field name is `name`
    pub fn relationship_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| {
            f.relationship.as_ref().is_some_and(|r| {
                r.relationship_name.eq_ignore_ascii_case(name) || f.name.eq_ignore_ascii_case(name)
            })
        })
    }
}

/// All object types the host describes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaRegistry {
    objects: BTreeMap<String, ObjectSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(mut self, schema: ObjectSchema) -> Self {
        self.insert(schema);
        self
    }

    pub fn insert(&mut self, schema: ObjectSchema) {
        self.objects.insert(schema.name.clone(), schema);
    }

    /// Object by name; exact match first, then case-insensitive
    pub fn get(&self, name: &str) -> Option<&ObjectSchema> {
        self.objects.get(name).or_else(|| {
            self.objects
                .values()
                .find(|o| o.name.eq_ignore_ascii_case(name))
        })
    }

    pub fn objects(&self) -> impl Iterator<Item = &ObjectSchema> {
        self.objects.values()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Parse a describe document: `{"objects": [{"name": .., "fields": [..]}]}`
    ///
    /// # Errors
    ///
    /// Returns `RollupError::Serialization` when the document is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        #[derive(Deserialize)]
        struct Document {
            objects: Vec<ObjectSchema>,
        }
        let doc: Document = serde_json::from_str(json)?;
        Ok(doc
            .objects
            .into_iter()
            .fold(SchemaRegistry::new(), |reg, o| reg.with_object(o)))
    }

    pub fn to_json(&self) -> Result<String> {
        let objects: Vec<&ObjectSchema> = self.objects.values().collect();
        serde_json::to_string_pretty(&serde_json::json!({ "objects": objects })).map_err(|e| {
            RollupError::Serialization {
                message: e.to_string(),
            }
        })
    }
}
