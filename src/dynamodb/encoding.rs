// ABOUTME: Tagged-value encoding of rows into DynamoDB attribute maps
// ABOUTME: Numbers, datetimes and ISO timestamps become N; everything else S

use crate::row::{format_number, FieldValue, RowRecord, ID_FIELD};
use anyhow::{bail, Result};
use aws_sdk_dynamodb::types::AttributeValue;
use chrono::DateTime;
use std::collections::HashMap;

/// DynamoDB item as sent in a `PutRequest`.
pub type Item = HashMap<String, AttributeValue>;

/// True for strings shaped exactly like `2020-01-01T00:00:00.000Z`.
pub fn is_iso_timestamp(value: &str) -> bool {
    const SHAPE: &[u8; 24] = b"dddd-dd-ddTdd:dd:dd.dddZ";
    let bytes = value.as_bytes();
    bytes.len() == SHAPE.len()
        && bytes.iter().zip(SHAPE.iter()).all(|(b, s)| match s {
            b'd' => b.is_ascii_digit(),
            other => b == other,
        })
}

/// Encode one field value.
///
/// Returns `None` when the textual form is empty, in which case the
/// attribute is left out of the item entirely.
///
/// # Examples
///
/// ```
/// # use datda::dynamodb::encoding::encode_value;
/// # use datda::row::FieldValue;
/// use aws_sdk_dynamodb::types::AttributeValue;
///
/// assert_eq!(
///     encode_value(&FieldValue::from("2020-01-01T00:00:00.000Z")),
///     Some(AttributeValue::N("1577836800000".to_string()))
/// );
/// assert_eq!(encode_value(&FieldValue::from("")), None);
/// ```
pub fn encode_value(value: &FieldValue) -> Option<AttributeValue> {
    let attribute = match value {
        FieldValue::Number(n) => AttributeValue::N(format_number(n)),
        FieldValue::DateTime(dt) => AttributeValue::N(dt.timestamp_millis().to_string()),
        FieldValue::String(s) if is_iso_timestamp(s) => match DateTime::parse_from_rfc3339(s) {
            Ok(dt) => AttributeValue::N(dt.timestamp_millis().to_string()),
            // Right shape, impossible date (month 13 and the like)
            Err(_) => AttributeValue::S(s.clone()),
        },
        FieldValue::String(s) => AttributeValue::S(s.clone()),
        other => AttributeValue::S(other.to_json().to_string()),
    };

    let empty = match &attribute {
        AttributeValue::N(text) | AttributeValue::S(text) => text.is_empty(),
        _ => false,
    };
    (!empty).then_some(attribute)
}

/// Encode a row into an item keyed on `primary_key`
///
/// The key attribute is seeded from the row's `id` as a string, then every
/// other field is encoded under its own name. A field sharing the key's
/// name therefore overrides the seeded value. `id` itself is never written.
pub fn encode_item(primary_key: &str, row: &RowRecord) -> Result<Item> {
    let id = match row.get(ID_FIELD) {
        Some(id) if !id.is_null() => id.to_key_string(),
        _ => bail!("row has no '{}' value for key attribute '{}'", ID_FIELD, primary_key),
    };

    let mut item = Item::with_capacity(row.len());
    item.insert(primary_key.to_string(), AttributeValue::S(id));

    for (name, value) in row {
        if name == ID_FIELD {
            continue;
        }
        if let Some(attribute) = encode_value(value) {
            item.insert(name.clone(), attribute);
        }
    }

    Ok(item)
}
