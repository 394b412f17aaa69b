// ABOUTME: JSONB landing tables for rows migrated into PostgreSQL
// ABOUTME: Handles table creation and transactional batch upserts keyed by id

use crate::utils::{quote_identifier, validate_table_name};
use anyhow::{Context, Result};
use tokio_postgres::types::ToSql;
use tokio_postgres::Client;

/// Rows per INSERT statement. Three parameters per row keeps each
/// statement far below PostgreSQL's 65535-parameter limit.
pub const STATEMENT_ROWS: usize = 1000;

/// Create a JSONB landing table
///
/// Structure:
/// - id: TEXT PRIMARY KEY (the row's `id` value)
/// - data: JSONB NOT NULL (complete row as JSON)
/// - _source_type: TEXT NOT NULL (store the row came from)
/// - _migrated_at: TIMESTAMP NOT NULL DEFAULT NOW()
///
/// Plus a GIN index on `data` and an index on `_migrated_at`.
///
/// # Examples
///
/// ```no_run
/// # use datda::postgres::writer::create_jsonb_table;
/// # async fn example(client: &tokio_postgres::Client) -> anyhow::Result<()> {
/// create_jsonb_table(client, "users").await?;
/// # Ok(())
/// # }
/// ```
pub async fn create_jsonb_table(client: &Client, table_name: &str) -> Result<()> {
    validate_table_name(table_name).context("Invalid table name for JSONB table creation")?;

    tracing::info!("Ensuring JSONB table '{}' exists", table_name);

    let table = quote_identifier(table_name);
    let statements = [
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY,
                data JSONB NOT NULL,
                _source_type TEXT NOT NULL,
                _migrated_at TIMESTAMP NOT NULL DEFAULT NOW()
            )
            "#,
            table
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} USING GIN (data)",
            quote_identifier(&format!("idx_{}_data", table_name)),
            table
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} (_migrated_at)",
            quote_identifier(&format!("idx_{}_migrated", table_name)),
            table
        ),
    ];

    for sql in &statements {
        client
            .batch_execute(sql)
            .await
            .with_context(|| format!("Failed to prepare JSONB table '{}'", table_name))?;
    }

    Ok(())
}

/// Build `INSERT ... ON CONFLICT (id) DO UPDATE` for `rows` rows.
pub fn upsert_statement(table_name: &str, rows: usize) -> String {
    let placeholders: Vec<String> = (0..rows)
        .map(|idx| {
            let base = idx * 3 + 1;
            format!("(${}, ${}, ${})", base, base + 1, base + 2)
        })
        .collect();

    format!(
        "INSERT INTO {} (id, data, _source_type) VALUES {} \
         ON CONFLICT (id) DO UPDATE SET \
         data = EXCLUDED.data, \
         _source_type = EXCLUDED._source_type, \
         _migrated_at = NOW()",
        quote_identifier(table_name),
        placeholders.join(", ")
    )
}

/// Upsert a batch of `(id, data)` rows inside one transaction
///
/// Every statement of the batch commits together, so a rejected row
/// leaves the table untouched.
pub async fn upsert_jsonb_batch(
    client: &mut Client,
    table_name: &str,
    rows: &[(String, serde_json::Value)],
    source_type: &str,
) -> Result<()> {
    validate_table_name(table_name).context("Invalid table name for JSONB batch insert")?;

    if rows.is_empty() {
        return Ok(());
    }

    let tx = client
        .transaction()
        .await
        .context("Failed to begin PostgreSQL transaction")?;

    for (chunk_num, chunk) in rows.chunks(STATEMENT_ROWS).enumerate() {
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(chunk.len() * 3);
        for (id, data) in chunk {
            params.push(id);
            params.push(data);
            params.push(&source_type);
        }

        tx.execute(&upsert_statement(table_name, chunk.len()), &params)
            .await
            .with_context(|| {
                format!(
                    "Failed to upsert chunk {} ({} rows) into '{}'",
                    chunk_num,
                    chunk.len(),
                    table_name
                )
            })?;
    }

    tx.commit()
        .await
        .with_context(|| format!("Failed to commit batch into '{}'", table_name))?;

    tracing::debug!("Upserted {} rows into '{}'", rows.len(), table_name);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_statement_placeholders() {
        let sql = upsert_statement("users", 2);
        assert!(sql.starts_with("INSERT INTO \"users\" (id, data, _source_type) VALUES ($1, $2, $3), ($4, $5, $6)"));
        assert!(sql.contains("ON CONFLICT (id) DO UPDATE"));
    }

    #[test]
    fn test_statement_size_within_parameter_limit() {
        assert!(STATEMENT_ROWS * 3 < 65535);
    }
}
