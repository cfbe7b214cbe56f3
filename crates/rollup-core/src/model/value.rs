use std::cmp::Ordering;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::schema::{FieldFamily, FieldType};

/// A single typed field value read from or written to a host record
///
/// Numbers are always decimal. Dates and date-times travel as ISO strings in
/// JSON and are only recognised as temporal values once coerced against a
/// field type (see [`FieldValue::coerce`]).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum FieldValue {
    #[default]
    Null,
    Boolean(bool),
    Number(Decimal),
    Text(String),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
}

impl FieldValue {
    pub fn text(s: impl Into<String>) -> Self {
        FieldValue::Text(s.into())
    }

    pub fn number(n: impl Into<Decimal>) -> Self {
        FieldValue::Number(n.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Null or empty text
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            FieldValue::Number(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Text rendering used by CONCAT and by text targets
    ///
    /// Returns `None` for Null.
    pub fn as_text(&self) -> Option<String> {
        match self {
            FieldValue::Null => None,
            FieldValue::Boolean(b) => Some(b.to_string()),
            FieldValue::Number(d) => Some(d.normalize().to_string()),
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            FieldValue::DateTime(dt) => Some(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        }
    }

    fn family_rank(&self) -> u8 {
        match self {
            FieldValue::Null => 0,
            FieldValue::Boolean(_) => 1,
            FieldValue::Number(_) => 2,
            FieldValue::Date(_) | FieldValue::DateTime(_) => 3,
            FieldValue::Text(_) => 4,
        }
    }

    /// Whether both values belong to the same comparison family
    pub fn same_family(&self, other: &FieldValue) -> bool {
        self.family_rank() == other.family_rank()
    }

    fn as_instant(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::DateTime(dt) => Some(*dt),
            FieldValue::Date(d) => d.and_hms_opt(0, 0, 0).map(|n| n.and_utc()),
            _ => None,
        }
    }

    /// Total order used by MIN/MAX and order-by criteria
    ///
    /// Null sorts lowest here; null placement for order-bys is decided by
    /// the caller. Values from different families order by family
    /// (boolean, number, temporal, text). Text compares case-insensitively
    /// first and falls back to exact bytes so the order stays total.
    pub fn total_cmp(&self, other: &FieldValue) -> Ordering {
        match (self, other) {
            (FieldValue::Boolean(a), FieldValue::Boolean(b)) => a.cmp(b),
            (FieldValue::Number(a), FieldValue::Number(b)) => a.cmp(b),
            (FieldValue::Text(a), FieldValue::Text(b)) => a
                .to_lowercase()
                .cmp(&b.to_lowercase())
                .then_with(|| a.cmp(b)),
            (a, b) if a.family_rank() == 3 && b.family_rank() == 3 => {
                a.as_instant().cmp(&b.as_instant())
            }
            (a, b) => a.family_rank().cmp(&b.family_rank()),
        }
    }

    /// Equality used when diffing a computed value against the stored one
    ///
    /// Numbers compare by value (1.0 equals 1.00) and Null equals empty text.
    pub fn equivalent(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (a, b) if a.is_blank() && b.is_blank() => true,
            (FieldValue::Number(a), FieldValue::Number(b)) => a == b,
            (a, b) if a.family_rank() == 3 && b.family_rank() == 3 => {
                a.as_instant() == b.as_instant()
            }
            (a, b) => a == b,
        }
    }

    /// Whether `stored` already holds this value once read as `field_type`
    ///
    /// JSON-backed hosts hand dates and long decimals back as text, so the
    /// stored side is coerced first. Text that does not coerce only matches
    /// itself.
    pub fn matches_stored(&self, stored: &FieldValue, field_type: FieldType) -> bool {
        if self.equivalent(stored) {
            return true;
        }
        let typed = stored.coerce(field_type);
        !(typed.is_null() && !stored.is_blank()) && self.equivalent(&typed)
    }

    /// Key used to count occurrences of a value (MOST/LEAST)
    pub fn occurrence_key(&self) -> Option<String> {
        let rank = self.family_rank();
        self.as_text().map(|t| format!("{}:{}", rank, t))
    }

    /// Convert to the representation expected by a field of `field_type`
    ///
    /// Values that cannot be represented become Null.
    pub fn coerce(&self, field_type: FieldType) -> FieldValue {
        if self.is_null() {
            return FieldValue::Null;
        }
        match field_type.family() {
            FieldFamily::Text => match self.as_text() {
                Some(t) => FieldValue::Text(t),
                None => FieldValue::Null,
            },
            FieldFamily::Numeric => match self {
                FieldValue::Number(d) => FieldValue::Number(*d),
                FieldValue::Boolean(b) => FieldValue::Number(if *b {
                    Decimal::ONE
                } else {
                    Decimal::ZERO
                }),
                FieldValue::Text(s) => parse_decimal(s.trim())
                    .map(FieldValue::Number)
                    .unwrap_or(FieldValue::Null),
                _ => FieldValue::Null,
            },
            FieldFamily::Boolean => match self {
                FieldValue::Boolean(b) => FieldValue::Boolean(*b),
                FieldValue::Number(d) => FieldValue::Boolean(!d.is_zero()),
                FieldValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" => FieldValue::Boolean(true),
                    "false" => FieldValue::Boolean(false),
                    _ => FieldValue::Null,
                },
                _ => FieldValue::Null,
            },
            FieldFamily::Temporal => {
                let instant = match self {
                    FieldValue::Text(s) => parse_temporal(s.trim()),
                    other => other.clone(),
                };
                match (field_type, instant) {
                    (FieldType::Date, FieldValue::DateTime(dt)) => {
                        FieldValue::Date(dt.date_naive())
                    }
                    (FieldType::DateTime, FieldValue::Date(d)) => d
                        .and_hms_opt(0, 0, 0)
                        .map(|n| FieldValue::DateTime(n.and_utc()))
                        .unwrap_or(FieldValue::Null),
                    (_, v @ (FieldValue::Date(_) | FieldValue::DateTime(_))) => v,
                    _ => FieldValue::Null,
                }
            }
        }
    }

    /// Round numbers to `scale` decimal places, midpoints away from zero
    pub fn rounded(&self, scale: Option<u32>) -> FieldValue {
        match (self, scale) {
            (FieldValue::Number(d), Some(scale)) => FieldValue::Number(
                d.round_dp_with_strategy(scale, rust_decimal::RoundingStrategy::MidpointAwayFromZero),
            ),
            (other, _) => other.clone(),
        }
    }
}

/// Parse a decimal from plain or scientific notation
pub fn parse_decimal(s: &str) -> Option<Decimal> {
    if s.is_empty() {
        return None;
    }
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

/// Parse an ISO date or date-time literal
pub fn parse_temporal(s: &str) -> FieldValue {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return FieldValue::DateTime(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return FieldValue::DateTime(naive.and_utc());
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return FieldValue::Date(d);
    }
    FieldValue::Null
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::Bool(b) => FieldValue::Boolean(b),
            serde_json::Value::Number(n) => {
                let raw = n.to_string();
                parse_decimal(&raw)
                    .map(FieldValue::Number)
                    .unwrap_or(FieldValue::Text(raw))
            }
            serde_json::Value::String(s) => FieldValue::Text(s),
            other => FieldValue::Text(other.to_string()),
        }
    }
}

impl From<FieldValue> for serde_json::Value {
    fn from(value: FieldValue) -> Self {
        match value {
            FieldValue::Null => serde_json::Value::Null,
            FieldValue::Boolean(b) => serde_json::Value::Bool(b),
            FieldValue::Number(d) => decimal_to_json(d),
            other => other
                .as_text()
                .map(serde_json::Value::String)
                .unwrap_or(serde_json::Value::Null),
        }
    }
}

fn decimal_to_json(d: Decimal) -> serde_json::Value {
    let d = d.normalize();
    if d.scale() == 0 {
        if let Some(i) = d.to_i64() {
            return serde_json::Value::from(i);
        }
    }
    // Only emit a float when it prints back as the same decimal
    match d.to_f64() {
        Some(f) if f.to_string() == d.to_string() => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or_else(|| serde_json::Value::String(d.to_string())),
        _ => serde_json::Value::String(d.to_string()),
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Boolean(b)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Number(Decimal::from(n))
    }
}

impl From<i32> for FieldValue {
    fn from(n: i32) -> Self {
        FieldValue::Number(Decimal::from(n))
    }
}

impl From<Decimal> for FieldValue {
    fn from(d: Decimal) -> Self {
        FieldValue::Number(d)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(d: NaiveDate) -> Self {
        FieldValue::Date(d)
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.as_text() {
            Some(t) => write!(f, "{}", t),
            None => write!(f, "null"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_json_numbers_become_decimals() {
        let v: FieldValue = serde_json::from_str("12.50").unwrap();
        assert_eq!(v, FieldValue::Number(dec("12.5")));

        let v: FieldValue = serde_json::from_str("1e3").unwrap();
        assert_eq!(v, FieldValue::Number(dec("1000")));
    }

    #[test]
    fn test_decimal_serializes_as_number_when_exact() {
        let json = serde_json::to_string(&FieldValue::Number(dec("42.00"))).unwrap();
        assert_eq!(json, "42");
        let json = serde_json::to_string(&FieldValue::Number(dec("0.1"))).unwrap();
        assert_eq!(json, "0.1");
    }

    #[test]
    fn test_text_order_is_case_insensitive_then_exact() {
        let a = FieldValue::text("apple");
        let b = FieldValue::text("Banana");
        let upper = FieldValue::text("Apple");
        assert_eq!(a.total_cmp(&b), Ordering::Less);
        assert_eq!(upper.total_cmp(&a), Ordering::Less);
        assert_ne!(upper.total_cmp(&a), Ordering::Equal);
    }

    #[test]
    fn test_equivalence_treats_blank_as_null() {
        assert!(FieldValue::Null.equivalent(&FieldValue::text("")));
        assert!(FieldValue::Number(dec("1.0")).equivalent(&FieldValue::Number(dec("1.00"))));
        assert!(!FieldValue::Number(dec("0")).equivalent(&FieldValue::Null));
    }

    #[test]
    fn test_coerce_text_to_temporal_and_numeric() {
        let d = FieldValue::text("2024-03-01").coerce(FieldType::Date);
        assert_eq!(
            d,
            FieldValue::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );

        let dt = FieldValue::text("2024-03-01T10:00:00Z").coerce(FieldType::Date);
        assert_eq!(
            dt,
            FieldValue::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );

        assert_eq!(
            FieldValue::text(" 7.25 ").coerce(FieldType::Currency),
            FieldValue::Number(dec("7.25"))
        );
        assert_eq!(FieldValue::text("n/a").coerce(FieldType::Number), FieldValue::Null);
    }

    #[test]
    fn test_rounding_to_scale() {
        let v = FieldValue::Number(dec("2.345")).rounded(Some(2));
        assert_eq!(v, FieldValue::Number(dec("2.35")));
        let v = FieldValue::text("x").rounded(Some(2));
        assert_eq!(v, FieldValue::text("x"));
    }

    #[test]
    fn test_stored_text_matches_typed_value() {
        let third = Decimal::from(4) / Decimal::from(3);
        let stored: FieldValue = serde_json::from_value(serde_json::Value::from(FieldValue::Number(third))).unwrap();
        assert!(matches!(stored, FieldValue::Text(_)));
        assert!(FieldValue::Number(third).matches_stored(&stored, FieldType::Number));

        let day = FieldValue::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert!(day.matches_stored(&FieldValue::text("2024-03-01"), FieldType::Date));
        assert!(!day.matches_stored(&FieldValue::text("2024-03-02"), FieldType::Date));

        let instant = FieldValue::text("2024-03-01T10:00:00.250Z").coerce(FieldType::DateTime);
        let stored = FieldValue::text(instant.as_text().unwrap());
        assert!(instant.matches_stored(&stored, FieldType::DateTime));

        // garbage never matches a null result
        assert!(!FieldValue::Null.matches_stored(&FieldValue::text("n/a"), FieldType::Number));
    }
}
