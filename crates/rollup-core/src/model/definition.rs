use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{Result, RollupError};

/// Aggregation applied to the source field of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Sum,
    Count,
    Average,
    Min,
    Max,
    Concat,
    ConcatDistinct,
    First,
    Last,
    Most,
    Least,
}

impl Operation {
    pub const ALL: [Operation; 11] = [
        Operation::Sum,
        Operation::Count,
        Operation::Average,
        Operation::Min,
        Operation::Max,
        Operation::Concat,
        Operation::ConcatDistinct,
        Operation::First,
        Operation::Last,
        Operation::Most,
        Operation::Least,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Sum => "SUM",
            Operation::Count => "COUNT",
            Operation::Average => "AVERAGE",
            Operation::Min => "MIN",
            Operation::Max => "MAX",
            Operation::Concat => "CONCAT",
            Operation::ConcatDistinct => "CONCAT_DISTINCT",
            Operation::First => "FIRST",
            Operation::Last => "LAST",
            Operation::Most => "MOST",
            Operation::Least => "LEAST",
        }
    }

    /// FIRST, LAST, MOST and LEAST pick a single item and need a tie-break
    pub fn is_order_dependent(&self) -> bool {
        matches!(
            self,
            Operation::First | Operation::Last | Operation::Most | Operation::Least
        )
    }

    pub fn is_concat(&self) -> bool {
        matches!(self, Operation::Concat | Operation::ConcatDistinct)
    }
}

impl std::str::FromStr for Operation {
    type Err = String;

    /// Case-insensitive; spaces and hyphens are treated as underscores
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == normalized)
            .ok_or_else(|| s.to_string())
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    #[serde(rename = "ASC", alias = "Ascending", alias = "asc")]
    Ascending,
    #[serde(rename = "DESC", alias = "Descending", alias = "desc")]
    Descending,
}

impl std::str::FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ASC" | "ASCENDING" => Ok(SortDirection::Ascending),
            "DESC" | "DESCENDING" => Ok(SortDirection::Descending),
            _ => Err(s.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NullOrdering {
    #[serde(rename = "NULLS FIRST")]
    First,
    #[serde(rename = "NULLS LAST")]
    Last,
}

impl NullOrdering {
    /// Nulls first when ascending, last when descending
    pub fn default_for(direction: SortDirection) -> Self {
        match direction {
            SortDirection::Ascending => NullOrdering::First,
            SortDirection::Descending => NullOrdering::Last,
        }
    }
}

impl std::str::FromStr for NullOrdering {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        match upper.split_whitespace().collect::<Vec<_>>().as_slice() {
            ["NULLS", "FIRST"] | ["FIRST"] => Ok(NullOrdering::First),
            ["NULLS", "LAST"] | ["LAST"] => Ok(NullOrdering::Last),
            _ => Err(s.to_string()),
        }
    }
}

/// One tie-break criterion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
    pub nulls: NullOrdering,
    #[serde(default)]
    pub ranking: u32,
}

impl OrderBy {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
            nulls: NullOrdering::default_for(direction),
            ranking: 0,
        }
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Ascending)
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Descending)
    }

    pub fn nulls(mut self, nulls: NullOrdering) -> Self {
        self.nulls = nulls;
        self
    }

    pub fn ranking(mut self, ranking: u32) -> Self {
        self.ranking = ranking;
        self
    }
}

/// A normalized rollup definition
///
/// Field identifiers here are logical (namespace already stripped) and
/// every optional setting has its default filled in. Raw host payloads are
/// turned into this form by [`crate::metadata::normalize_definition`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollupDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub calc_item_type: String,
    pub lookup_field_on_calc_item: String,
    pub lookup_field_on_parent: String,
    pub parent_type: String,
    pub source_field: String,
    pub target_field: String,
    pub operation: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default)]
    pub concat_delimiter: String,
    #[serde(default)]
    pub split_delimiter_on_source: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grandparent_path: Option<String>,
    /// Sorted by ranking; equal rankings keep their listed order
    #[serde(default)]
    pub order_bys: Vec<OrderBy>,
    #[serde(default)]
    pub count_nulls: bool,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl RollupDefinition {
    /// Definition with the join and operation set and every option defaulted
    pub fn new(
        calc_item_type: impl Into<String>,
        lookup_field_on_calc_item: impl Into<String>,
        parent_type: impl Into<String>,
        lookup_field_on_parent: impl Into<String>,
        source_field: impl Into<String>,
        target_field: impl Into<String>,
        operation: Operation,
    ) -> Self {
        Self {
            id: None,
            label: None,
            calc_item_type: calc_item_type.into(),
            lookup_field_on_calc_item: lookup_field_on_calc_item.into(),
            lookup_field_on_parent: lookup_field_on_parent.into(),
            parent_type: parent_type.into(),
            source_field: source_field.into(),
            target_field: target_field.into(),
            operation,
            filter: None,
            concat_delimiter: String::new(),
            split_delimiter_on_source: false,
            limit: None,
            grandparent_path: None,
            order_bys: Vec::new(),
            count_nulls: false,
            active: true,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.concat_delimiter = delimiter.into();
        self
    }

    pub fn split_on_source(mut self) -> Self {
        self.split_delimiter_on_source = true;
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_grandparent_path(mut self, path: impl Into<String>) -> Self {
        self.grandparent_path = Some(path.into());
        self
    }

    /// Append an order-by; rankings are re-sorted stably
    pub fn with_order_by(mut self, order_by: OrderBy) -> Self {
        self.order_bys.push(order_by);
        self.order_bys.sort_by_key(|o| o.ranking);
        self
    }

    pub fn counting_nulls(mut self) -> Self {
        self.count_nulls = true;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Stable key: the id when present, else a fingerprint of the content
    pub fn key(&self) -> String {
        match &self.id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => format!("fp:{}", self.fingerprint()),
        }
    }

    /// SHA-256 over the canonical JSON form
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&canonical))
    }

    /// Human-readable name for logs and messages
    pub fn display_name(&self) -> String {
        match (&self.label, &self.id) {
            (Some(label), _) => label.clone(),
            (None, Some(id)) => id.clone(),
            (None, None) => format!(
                "{}({}.{}) -> {}.{}",
                self.operation,
                self.calc_item_type,
                self.source_field,
                self.parent_type,
                self.target_field
            ),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(RollupError::from)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(RollupError::from)
    }
}
