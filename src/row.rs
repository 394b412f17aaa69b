// ABOUTME: Store-agnostic row model shared by every adapter
// ABOUTME: Defines field values, row records and table descriptors

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Name of the implicit field that carries a row's primary-key value.
pub const ID_FIELD: &str = "id";

/// A single schemaless row: field name → value.
pub type RowRecord = BTreeMap<String, FieldValue>;

/// A table or collection discovered on the source store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Logical table name, without any store-level prefix
    pub name: String,
    /// Attribute acting as unique row identifier in both stores
    pub primary_key: String,
    /// Populated by the count query; may be stale if the source mutates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_of_rows: Option<u64>,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: primary_key.into(),
            number_of_rows: None,
        }
    }
}

/// Typed value of one field.
///
/// Every store converts its native types into this union on export and
/// out of it on import, so the orchestrator never inspects store types.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    DateTime(DateTime<Utc>),
    /// Nested documents and arrays
    Structured(JsonValue),
}

impl FieldValue {
    /// Build a numeric value, keeping non-finite floats as strings since
    /// JSON cannot represent them.
    pub fn from_f64(value: f64) -> Self {
        match serde_json::Number::from_f64(value) {
            Some(n) => FieldValue::Number(n),
            None => FieldValue::String(value.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert a JSON value; objects and arrays become `Structured`.
    pub fn from_json(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => FieldValue::Null,
            JsonValue::Bool(b) => FieldValue::Bool(b),
            JsonValue::Number(n) => FieldValue::Number(n),
            JsonValue::String(s) => FieldValue::String(s),
            other => FieldValue::Structured(other),
        }
    }

    /// JSON view of the value. Datetimes render as RFC 3339 with
    /// millisecond precision and a `Z` suffix.
    pub fn to_json(&self) -> JsonValue {
        match self {
            FieldValue::Null => JsonValue::Null,
            FieldValue::Bool(b) => JsonValue::Bool(*b),
            FieldValue::Number(n) => JsonValue::Number(n.clone()),
            FieldValue::String(s) => JsonValue::String(s.clone()),
            FieldValue::DateTime(dt) => {
                JsonValue::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            FieldValue::Structured(v) => v.clone(),
        }
    }

    /// Plain-text rendering used for identifiers: strings stay unquoted,
    /// everything else is its JSON text.
    pub fn to_key_string(&self) -> String {
        match self {
            FieldValue::String(s) => s.clone(),
            FieldValue::Number(n) => format_number(n),
            other => other.to_json().to_string(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(value.into())
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Number(value.into())
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::DateTime(value)
    }
}

/// Render a number the way a JavaScript runtime would: integral floats
/// lose their trailing `.0`, and magnitudes of at least 1e21 or below 1e-6
/// switch to exponent form (`1e+21`, `1.5e-7`).
pub fn format_number(n: &serde_json::Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    match n.as_f64() {
        Some(f) if f == 0.0 => "0".to_string(),
        Some(f) if f.abs() >= 1e21 || f.abs() < 1e-6 => {
            let formatted = format!("{:e}", f);
            match formatted.split_once('e') {
                Some((mantissa, exponent)) if !exponent.starts_with('-') => {
                    format!("{}e+{}", mantissa, exponent)
                }
                _ => formatted,
            }
        }
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

/// Convert a whole row into a JSON object.
pub fn row_to_json(row: &RowRecord) -> JsonValue {
    let map: serde_json::Map<String, JsonValue> = row
        .iter()
        .map(|(name, value)| (name.clone(), value.to_json()))
        .collect();
    JsonValue::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_from_json_keeps_scalars_and_wraps_structures() {
        assert_eq!(FieldValue::from_json(json!(null)), FieldValue::Null);
        assert_eq!(FieldValue::from_json(json!(true)), FieldValue::Bool(true));
        assert_eq!(FieldValue::from_json(json!(30)), FieldValue::from(30));
        assert_eq!(FieldValue::from_json(json!("a")), FieldValue::from("a"));
        assert_eq!(
            FieldValue::from_json(json!({"x": 1})),
            FieldValue::Structured(json!({"x": 1}))
        );
        assert_eq!(
            FieldValue::from_json(json!([1, 2])),
            FieldValue::Structured(json!([1, 2]))
        );
    }

    #[test]
    fn test_datetime_renders_with_millis() {
        let dt = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            FieldValue::DateTime(dt).to_json(),
            json!("2020-01-01T00:00:00.000Z")
        );
    }

    #[test]
    fn test_non_finite_float_becomes_string() {
        assert!(matches!(FieldValue::from_f64(f64::NAN), FieldValue::String(_)));
        assert!(matches!(FieldValue::from_f64(1.5), FieldValue::Number(_)));
    }

    #[test]
    fn test_format_number_drops_integral_fraction() {
        assert_eq!(format_number(&serde_json::Number::from(30)), "30");
        assert_eq!(
            format_number(&serde_json::Number::from_f64(30.0).unwrap()),
            "30"
        );
        assert_eq!(
            format_number(&serde_json::Number::from_f64(2.5).unwrap()),
            "2.5"
        );
    }

    #[test]
    fn test_format_number_uses_exponent_outside_plain_range() {
        let render = |f: f64| format_number(&serde_json::Number::from_f64(f).unwrap());
        assert_eq!(render(1e21), "1e+21");
        assert_eq!(render(1.5e22), "1.5e+22");
        assert_eq!(render(1e-7), "1e-7");
        assert_eq!(render(-2.5e-8), "-2.5e-8");
        assert_eq!(render(1e20), "100000000000000000000");
        assert_eq!(render(0.000001), "0.000001");
        assert_eq!(render(-0.0), "0");
    }

    #[test]
    fn test_key_string() {
        assert_eq!(FieldValue::from("u1").to_key_string(), "u1");
        assert_eq!(FieldValue::from(7).to_key_string(), "7");
        assert_eq!(FieldValue::Bool(false).to_key_string(), "false");
    }

    #[test]
    fn test_row_to_json_renders_every_field() {
        let mut row = RowRecord::new();
        row.insert("id".to_string(), FieldValue::from("u1"));
        row.insert("age".to_string(), FieldValue::from(30));
        row.insert("tags".to_string(), FieldValue::Structured(json!(["a"])));
        assert_eq!(row_to_json(&row), json!({"id": "u1", "age": 30, "tags": ["a"]}));
    }
}
