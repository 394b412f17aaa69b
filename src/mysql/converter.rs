// ABOUTME: MySQL value conversion into the shared row model
// ABOUTME: Handles integers, floats, text, binary data, dates and times

use crate::row::{FieldValue, RowRecord};
use anyhow::{Context, Result};
use base64::Engine;
use chrono::{NaiveDate, TimeZone, Utc};
use mysql_async::{Row, Value};

/// Convert a MySQL value to a field value
///
/// - Integers and floats → number (non-finite floats as strings)
/// - Text (including DECIMAL, sent as text) → string
/// - Non-UTF-8 bytes → `{"_type": "binary", "data": "<base64>"}`
/// - DATE/DATETIME/TIMESTAMP → datetime in UTC; zero dates become null
/// - TIME → string such as `1d 10:30:45.000000`
///
/// # Examples
///
/// ```
/// # use mysql_async::Value;
/// # use datda::mysql::converter::mysql_value_to_field;
/// # use datda::row::FieldValue;
/// assert_eq!(mysql_value_to_field(Value::Int(42)), FieldValue::from(42));
/// ```
pub fn mysql_value_to_field(value: Value) -> FieldValue {
    match value {
        Value::NULL => FieldValue::Null,

        Value::Int(i) => FieldValue::from(i),
        Value::UInt(u) => FieldValue::Number(u.into()),

        Value::Float(f) => FieldValue::from_f64(f as f64),
        Value::Double(d) => FieldValue::from_f64(d),

        Value::Bytes(b) => match String::from_utf8(b) {
            Ok(s) => FieldValue::String(s),
            Err(err) => {
                let encoded =
                    base64::engine::general_purpose::STANDARD.encode(err.into_bytes());
                FieldValue::Structured(serde_json::json!({
                    "_type": "binary",
                    "data": encoded
                }))
            }
        },

        Value::Date(year, month, day, hour, minute, second, micro) => {
            NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
                .and_then(|d| d.and_hms_micro_opt(hour as u32, minute as u32, second as u32, micro))
                .map(|naive| FieldValue::DateTime(Utc.from_utc_datetime(&naive)))
                .unwrap_or(FieldValue::Null)
        }

        Value::Time(is_negative, days, hours, minutes, seconds, microseconds) => {
            let sign = if is_negative { "-" } else { "" };
            FieldValue::String(format!(
                "{}{}d {:02}:{:02}:{:02}.{:06}",
                sign, days, hours, minutes, seconds, microseconds
            ))
        }
    }
}

/// Convert a MySQL row into a record keyed by column name.
pub fn mysql_row_to_record(row: Row) -> Result<RowRecord> {
    let column_names: Vec<String> = row
        .columns_ref()
        .iter()
        .map(|c| c.name_str().into_owned())
        .collect();

    let mut record = RowRecord::new();
    for (idx, col_name) in column_names.into_iter().enumerate() {
        let value: Value = row
            .get(idx)
            .with_context(|| format!("Failed to get column {} at index {}", col_name, idx))?;
        record.insert(col_name, mysql_value_to_field(value));
    }

    Ok(record)
}
