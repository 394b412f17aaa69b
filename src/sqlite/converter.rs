// ABOUTME: SQLite value conversion to and from the shared row model
// ABOUTME: Handles all SQLite storage classes with BLOB base64 encoding

use crate::row::{FieldValue, RowRecord};
use anyhow::{Context, Result};
use base64::Engine;
use chrono::SecondsFormat;
use rusqlite::types::Value;
use serde_json::Value as JsonValue;

/// Marker stored in the `_type` key of an encoded BLOB.
pub const BLOB_TYPE: &str = "blob";

/// Convert a single SQLite value to a field value
///
/// Maps SQLite storage classes:
/// - INTEGER → number
/// - REAL → number (non-finite values become strings)
/// - TEXT → string
/// - BLOB → `{"_type": "blob", "data": "<base64>"}`
/// - NULL → null
///
/// # Examples
///
/// ```
/// # use datda::sqlite::converter::sqlite_value_to_field;
/// # use datda::row::FieldValue;
/// # use rusqlite::types::Value;
/// assert_eq!(sqlite_value_to_field(Value::Integer(42)), FieldValue::from(42));
/// ```
pub fn sqlite_value_to_field(value: Value) -> FieldValue {
    match value {
        Value::Null => FieldValue::Null,
        Value::Integer(i) => FieldValue::from(i),
        Value::Real(f) => FieldValue::from_f64(f),
        Value::Text(s) => FieldValue::String(s),
        Value::Blob(b) => {
            let encoded = base64::engine::general_purpose::STANDARD.encode(b);
            FieldValue::Structured(serde_json::json!({
                "_type": BLOB_TYPE,
                "data": encoded
            }))
        }
    }
}

/// Convert a field value into something SQLite can bind
///
/// Booleans become 0/1 and datetimes RFC 3339 text. Structured values are
/// stored as JSON text, except encoded BLOBs which are decoded back to
/// raw bytes.
pub fn field_to_sqlite_value(value: &FieldValue) -> Result<Value> {
    Ok(match value {
        FieldValue::Null => Value::Null,
        FieldValue::Bool(b) => Value::Integer(i64::from(*b)),
        FieldValue::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        FieldValue::String(s) => Value::Text(s.clone()),
        FieldValue::DateTime(dt) => Value::Text(dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
        FieldValue::Structured(json) => match decode_blob(json)? {
            Some(bytes) => Value::Blob(bytes),
            None => Value::Text(json.to_string()),
        },
    })
}

fn decode_blob(json: &JsonValue) -> Result<Option<Vec<u8>>> {
    let Some(obj) = json.as_object() else {
        return Ok(None);
    };
    if obj.len() != 2 || obj.get("_type").and_then(JsonValue::as_str) != Some(BLOB_TYPE) {
        return Ok(None);
    }
    let Some(data) = obj.get("data").and_then(JsonValue::as_str) else {
        return Ok(None);
    };
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data)
        .context("Failed to decode base64 BLOB payload")?;
    Ok(Some(bytes))
}

/// Convert a row of `(column, value)` pairs into a record.
pub fn sqlite_row_to_record(columns: Vec<(String, Value)>) -> RowRecord {
    columns
        .into_iter()
        .map(|(name, value)| (name, sqlite_value_to_field(value)))
        .collect()
}
