// ABOUTME: SQLite database introspection and paged data reading
// ABOUTME: Functions to list tables, resolve primary keys, count and page rows

use crate::row::RowRecord;
use crate::sqlite::converter::sqlite_row_to_record;
use crate::utils::{quote_identifier, validate_table_name};
use anyhow::{Context, Result};
use rusqlite::Connection;

/// Implicit key used when a table declares no single-column primary key.
pub const ROWID: &str = "rowid";

/// List all user tables in a SQLite database
///
/// Queries sqlite_master for user-created tables, excluding the
/// `sqlite_*` system tables. Sorted by name.
///
/// # Examples
///
/// ```no_run
/// # use datda::sqlite::{open_sqlite, reader::list_tables};
/// # fn example() -> anyhow::Result<()> {
/// let conn = open_sqlite("database.db")?;
/// for table in list_tables(&conn)? {
///     println!("Table: {}", table);
/// }
/// # Ok(())
/// # }
/// ```
pub fn list_tables(conn: &Connection) -> Result<Vec<String>> {
    tracing::debug!("Listing tables from SQLite database");

    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master \
             WHERE type='table' \
             AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )
        .context("Failed to prepare statement to list tables")?;

    let tables = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("Failed to query table list")?
        .collect::<Result<Vec<String>, _>>()
        .context("Failed to collect table names")?;

    tracing::info!("Found {} user tables in SQLite database", tables.len());

    Ok(tables)
}

/// Column names of `table`, in declaration order.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let query = format!("PRAGMA table_info({})", quote_identifier(table));
    let mut stmt = conn
        .prepare(&query)
        .with_context(|| format!("Failed to get table info for '{}'", table))?;

    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .context("Failed to query table columns")?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to collect column names")?;

    Ok(columns)
}

/// Resolve the primary key column of `table`
///
/// Returns the declared primary key when it is a single column, and
/// [`ROWID`] otherwise (no key, or a composite key).
pub fn detect_primary_key(conn: &Connection, table: &str) -> Result<String> {
    let query = format!("PRAGMA table_info({})", quote_identifier(table));
    let mut stmt = conn
        .prepare(&query)
        .with_context(|| format!("Failed to get table info for '{}'", table))?;

    // Column 5 is the 1-based position within the primary key, 0 if not part of it
    let pk_columns = stmt
        .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, i64>(5)?)))
        .context("Failed to query primary key columns")?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to collect primary key columns")?
        .into_iter()
        .filter(|(_, pk)| *pk > 0)
        .map(|(name, _)| name)
        .collect::<Vec<_>>();

    match pk_columns.as_slice() {
        [single] => {
            tracing::debug!("Using column '{}' as primary key for '{}'", single, table);
            Ok(single.clone())
        }
        _ => {
            tracing::debug!("No single-column primary key on '{}', using rowid", table);
            Ok(ROWID.to_string())
        }
    }
}

/// Get row count for a specific table
///
/// # Security
///
/// The table name is validated before it is interpolated.
pub fn get_table_row_count(conn: &Connection, table: &str) -> Result<u64> {
    validate_table_name(table).context("Invalid table name for row count query")?;

    tracing::debug!("Getting row count for table '{}'", table);

    let query = format!("SELECT COUNT(*) FROM {}", quote_identifier(table));

    let count: i64 = conn
        .query_row(&query, [], |row| row.get(0))
        .with_context(|| format!("Failed to count rows in table '{}'", table))?;

    Ok(count.max(0) as u64)
}

/// Read one page of a table
///
/// Rows are ordered by `primary_key` so consecutive pages never overlap.
/// When the key is [`ROWID`], the rowid is selected as an extra column.
///
/// # Examples
///
/// ```no_run
/// # use datda::sqlite::{open_sqlite, reader::read_table_page};
/// # fn example() -> anyhow::Result<()> {
/// let conn = open_sqlite("database.db")?;
/// let rows = read_table_page(&conn, "users", "id", 100, 0)?;
/// println!("Read {} rows", rows.len());
/// # Ok(())
/// # }
/// ```
pub fn read_table_page(
    conn: &Connection,
    table: &str,
    primary_key: &str,
    limit: u64,
    offset: u64,
) -> Result<Vec<RowRecord>> {
    validate_table_name(table).context("Invalid table name for data reading")?;

    let query = if primary_key == ROWID {
        format!(
            "SELECT rowid AS {rowid}, * FROM {table} ORDER BY rowid LIMIT ?1 OFFSET ?2",
            rowid = quote_identifier(ROWID),
            table = quote_identifier(table)
        )
    } else {
        format!(
            "SELECT * FROM {} ORDER BY {} LIMIT ?1 OFFSET ?2",
            quote_identifier(table),
            quote_identifier(primary_key)
        )
    };

    let mut stmt = conn
        .prepare(&query)
        .with_context(|| format!("Failed to prepare statement for table '{}'", table))?;

    let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

    let rows = stmt
        .query_map([limit as i64, offset as i64], |row| {
            let mut values = Vec::with_capacity(column_names.len());
            for (idx, col_name) in column_names.iter().enumerate() {
                let value: rusqlite::types::Value = row.get(idx)?;
                values.push((col_name.clone(), value));
            }
            Ok(sqlite_row_to_record(values))
        })
        .with_context(|| format!("Failed to query rows from table '{}'", table))?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to collect rows from table '{}'", table))?;

    tracing::debug!(
        "Read {} rows from table '{}' at offset {}",
        rows.len(),
        table,
        offset
    );

    Ok(rows)
}
