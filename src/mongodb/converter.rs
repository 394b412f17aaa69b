// ABOUTME: BSON conversion to and from the shared row model
// ABOUTME: Maps ObjectIds, datetimes, binaries and nested documents

use crate::row::{FieldValue, RowRecord};
use anyhow::{Context, Result};
use base64::Engine;
use bson::{spec::BinarySubtype, Binary, Bson, Document};

/// Convert a BSON value to a field value
///
/// - ObjectId → 24-character hex string
/// - DateTime → datetime
/// - Int32/Int64/Double → number
/// - Decimal128 → string, to keep its precision
/// - Binary → `{"_type": "binary", "data": "<base64>"}`
/// - Documents, arrays and everything else → relaxed extended JSON
pub fn bson_to_field(value: Bson) -> FieldValue {
    match value {
        Bson::Null | Bson::Undefined => FieldValue::Null,
        Bson::Boolean(b) => FieldValue::Bool(b),
        Bson::Int32(i) => FieldValue::from(i),
        Bson::Int64(i) => FieldValue::from(i),
        Bson::Double(d) => FieldValue::from_f64(d),
        Bson::String(s) => FieldValue::String(s),
        Bson::ObjectId(oid) => FieldValue::String(oid.to_hex()),
        Bson::DateTime(dt) => FieldValue::DateTime(dt.to_chrono()),
        Bson::Decimal128(d) => FieldValue::String(d.to_string()),
        Bson::Binary(bin) => FieldValue::Structured(serde_json::json!({
            "_type": "binary",
            "data": base64::engine::general_purpose::STANDARD.encode(&bin.bytes)
        })),
        other => FieldValue::from_json(other.into_relaxed_extjson()),
    }
}

/// Convert a field value into BSON for writing
///
/// Structured values are read as extended JSON, so plain objects and
/// arrays become documents and arrays.
pub fn field_to_bson(value: &FieldValue) -> Result<Bson> {
    Ok(match value {
        FieldValue::Null => Bson::Null,
        FieldValue::Bool(b) => Bson::Boolean(*b),
        FieldValue::Number(n) => match n.as_i64() {
            Some(i) => Bson::Int64(i),
            None => Bson::Double(n.as_f64().unwrap_or(f64::NAN)),
        },
        FieldValue::String(s) => Bson::String(s.clone()),
        FieldValue::DateTime(dt) => Bson::DateTime(bson::DateTime::from_chrono(*dt)),
        FieldValue::Structured(json) => {
            if let Some(bytes) = binary_payload(json)? {
                Bson::Binary(Binary {
                    subtype: BinarySubtype::Generic,
                    bytes,
                })
            } else {
                Bson::try_from(json.clone()).context("Failed to convert JSON value to BSON")?
            }
        }
    })
}

/// Decode `{"_type": "binary"|"blob", "data": "<base64>"}` objects.
fn binary_payload(json: &serde_json::Value) -> Result<Option<Vec<u8>>> {
    let Some(obj) = json.as_object() else {
        return Ok(None);
    };
    let is_binary = matches!(
        obj.get("_type").and_then(|t| t.as_str()),
        Some("binary") | Some("blob")
    );
    match (is_binary, obj.len(), obj.get("data").and_then(|d| d.as_str())) {
        (true, 2, Some(data)) => base64::engine::general_purpose::STANDARD
            .decode(data)
            .map(Some)
            .context("Failed to decode base64 binary payload"),
        _ => Ok(None),
    }
}

pub fn document_to_record(doc: Document) -> RowRecord {
    doc.into_iter()
        .map(|(key, value)| (key, bson_to_field(value)))
        .collect()
}

pub fn record_to_document(row: &RowRecord) -> Result<Document> {
    let mut doc = Document::new();
    for (key, value) in row {
        let bson = field_to_bson(value).with_context(|| format!("Failed to convert field '{}'", key))?;
        doc.insert(key.clone(), bson);
    }
    Ok(doc)
}
