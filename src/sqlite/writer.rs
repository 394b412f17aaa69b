// ABOUTME: SQLite target writes: landing table creation and batched upserts
// ABOUTME: Each batch is one transaction of INSERT OR REPLACE statements

use crate::row::{RowRecord, ID_FIELD};
use crate::sqlite::converter::field_to_sqlite_value;
use crate::sqlite::reader::table_columns;
use crate::utils::{quote_identifier, validate_table_name};
use anyhow::{Context, Result};
use rusqlite::Connection;
use std::collections::BTreeSet;

/// Make sure `table` exists and has a column for every field in `rows`.
///
/// A missing table is created keyed on `id`. Columns are added untyped,
/// since rows are schemaless and SQLite accepts any value in them.
pub fn ensure_table(conn: &Connection, table: &str, rows: &[RowRecord]) -> Result<()> {
    validate_table_name(table).context("Invalid table name for write")?;

    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {} ({} PRIMARY KEY)",
            quote_identifier(table),
            quote_identifier(ID_FIELD)
        ),
        [],
    )
    .with_context(|| format!("Failed to create table '{}'", table))?;

    let existing: BTreeSet<String> = table_columns(conn, table)?
        .into_iter()
        .map(|c| c.to_lowercase())
        .collect();

    let wanted: BTreeSet<&str> = rows
        .iter()
        .flat_map(|row| row.keys().map(String::as_str))
        .collect();

    for column in wanted {
        if existing.contains(&column.to_lowercase()) {
            continue;
        }
        tracing::debug!("Adding column '{}' to table '{}'", column, table);
        conn.execute(
            &format!(
                "ALTER TABLE {} ADD COLUMN {}",
                quote_identifier(table),
                quote_identifier(column)
            ),
            [],
        )
        .with_context(|| format!("Failed to add column '{}' to table '{}'", column, table))?;
    }

    Ok(())
}

/// Upsert `rows` into `table` inside a single transaction.
///
/// Either every row is written or none is.
pub fn upsert_rows(conn: &mut Connection, table: &str, rows: &[RowRecord]) -> Result<usize> {
    if rows.is_empty() {
        return Ok(0);
    }

    ensure_table(conn, table, rows)?;

    let tx = conn
        .transaction()
        .context("Failed to begin SQLite transaction")?;

    for (idx, row) in rows.iter().enumerate() {
        let columns: Vec<String> = row.keys().map(|k| quote_identifier(k)).collect();
        let placeholders: Vec<String> = (1..=row.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
            quote_identifier(table),
            columns.join(", "),
            placeholders.join(", ")
        );

        let values = row
            .iter()
            .map(|(name, value)| {
                field_to_sqlite_value(value)
                    .with_context(|| format!("Failed to convert field '{}'", name))
            })
            .collect::<Result<Vec<_>>>()?;

        tx.execute(&sql, rusqlite::params_from_iter(values))
            .with_context(|| format!("Failed to write row {} of batch into '{}'", idx + 1, table))?;
    }

    tx.commit()
        .with_context(|| format!("Failed to commit batch into '{}'", table))?;

    Ok(rows.len())
}
