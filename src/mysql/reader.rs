// ABOUTME: MySQL database introspection and paged data reading
// ABOUTME: Lists tables, resolves primary keys, counts and pages rows read-only

use crate::mysql::converter::mysql_row_to_record;
use crate::row::RowRecord;
use crate::utils::validate_table_name;
use anyhow::{Context, Result};
use mysql_async::{prelude::*, Conn, Row};

/// List all user tables in a MySQL database
///
/// Queries INFORMATION_SCHEMA for base tables, in alphabetical order.
///
/// # Examples
///
/// ```no_run
/// # use datda::mysql::{connect_mysql, reader::list_tables};
/// # async fn example() -> anyhow::Result<()> {
/// let mut conn = connect_mysql("mysql://localhost:3306/mydb").await?;
/// let tables = list_tables(&mut conn, "mydb").await?;
/// println!("Found {} tables", tables.len());
/// # Ok(())
/// # }
/// ```
pub async fn list_tables(conn: &mut Conn, db_name: &str) -> Result<Vec<String>> {
    tracing::info!("Listing tables from MySQL database '{}'", db_name);

    let query = r#"
        SELECT TABLE_NAME
        FROM INFORMATION_SCHEMA.TABLES
        WHERE TABLE_SCHEMA = ?
        AND TABLE_TYPE = 'BASE TABLE'
        ORDER BY TABLE_NAME
    "#;

    let tables: Vec<String> = conn
        .exec(query, (db_name,))
        .await
        .with_context(|| format!("Failed to list tables from database '{}'", db_name))?;

    tracing::info!("Found {} table(s) in database '{}'", tables.len(), db_name);

    Ok(tables)
}

/// Primary key columns of a table, in key order. Empty when the table
/// has no primary key.
pub async fn primary_key_columns(
    conn: &mut Conn,
    db_name: &str,
    table_name: &str,
) -> Result<Vec<String>> {
    let query = r#"
        SELECT COLUMN_NAME
        FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
        WHERE TABLE_SCHEMA = ?
        AND TABLE_NAME = ?
        AND CONSTRAINT_NAME = 'PRIMARY'
        ORDER BY ORDINAL_POSITION
    "#;

    let columns: Vec<String> = conn
        .exec(query, (db_name, table_name))
        .await
        .with_context(|| {
            format!(
                "Failed to get primary key for table '{}.{}'",
                db_name, table_name
            )
        })?;

    Ok(columns)
}

/// Column names of a table, in ordinal order.
pub async fn get_column_names(
    conn: &mut Conn,
    db_name: &str,
    table_name: &str,
) -> Result<Vec<String>> {
    validate_table_name(table_name).context("Invalid table name for column query")?;

    let query = r#"
        SELECT COLUMN_NAME
        FROM INFORMATION_SCHEMA.COLUMNS
        WHERE TABLE_SCHEMA = ?
        AND TABLE_NAME = ?
        ORDER BY ORDINAL_POSITION
    "#;

    let columns: Vec<String> = conn
        .exec(query, (db_name, table_name))
        .await
        .with_context(|| {
            format!(
                "Failed to get column names for table '{}.{}'",
                db_name, table_name
            )
        })?;

    Ok(columns)
}

/// Get row count for a MySQL table
///
/// # Examples
///
/// ```no_run
/// # use datda::mysql::{connect_mysql, reader::get_table_row_count};
/// # async fn example() -> anyhow::Result<()> {
/// let mut conn = connect_mysql("mysql://localhost:3306/mydb").await?;
/// let count = get_table_row_count(&mut conn, "mydb", "users").await?;
/// println!("Table has {} rows", count);
/// # Ok(())
/// # }
/// ```
pub async fn get_table_row_count(conn: &mut Conn, db_name: &str, table_name: &str) -> Result<u64> {
    validate_table_name(table_name).context("Invalid table name for count query")?;

    tracing::debug!("Getting row count for table '{}.{}'", db_name, table_name);

    let query = format!(
        "SELECT COUNT(*) FROM {}.{}",
        quote_mysql(db_name),
        quote_mysql(table_name)
    );

    let count: Option<u64> = conn
        .query_first(&query)
        .await
        .with_context(|| format!("Failed to count rows in table '{}'", table_name))?;

    Ok(count.unwrap_or(0))
}

/// Read one page of a MySQL table
///
/// `order_by` must name columns that give a total order (the primary key,
/// or every column for keyless tables) so pages never overlap.
pub async fn read_table_page(
    conn: &mut Conn,
    db_name: &str,
    table_name: &str,
    order_by: &[String],
    limit: u64,
    offset: u64,
) -> Result<Vec<RowRecord>> {
    validate_table_name(table_name).context("Invalid table name for data reading")?;

    let order = if order_by.is_empty() {
        String::new()
    } else {
        let columns: Vec<String> = order_by.iter().map(|c| quote_mysql(c)).collect();
        format!(" ORDER BY {}", columns.join(", "))
    };

    let query = format!(
        "SELECT * FROM {}.{}{} LIMIT ? OFFSET ?",
        quote_mysql(db_name),
        quote_mysql(table_name),
        order
    );

    let rows: Vec<Row> = conn
        .exec(&query, (limit, offset))
        .await
        .with_context(|| format!("Failed to read data from table '{}'", table_name))?;

    tracing::debug!(
        "Read {} rows from table '{}' at offset {}",
        rows.len(),
        table_name,
        offset
    );

    rows.into_iter()
        .map(mysql_row_to_record)
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("Failed to convert rows of table '{}'", table_name))
}

/// Backtick-quote a MySQL identifier.
pub fn quote_mysql(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}
