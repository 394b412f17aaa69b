// ABOUTME: Tables command listing what a migration would copy
// ABOUTME: Connects to the source only and prints filtered tables with row counts

use crate::config::load_options_from_file;
use crate::orchestrator::discover_tables;
use anyhow::{Context, Result};

/// Print the source tables that pass the whitelist/blacklist filter.
pub async fn tables(config_path: &str) -> Result<()> {
    let options = load_options_from_file(config_path)?;
    let source = options.source;

    let tables = discover_tables(options)
        .await
        .with_context(|| format!("Failed to list tables on {}", source))?;

    if tables.is_empty() {
        println!("No tables to migrate from {}", source);
        return Ok(());
    }

    println!("{:<40} {:<20} {:>12}", "TABLE", "PRIMARY KEY", "ROWS");
    for table in &tables {
        println!(
            "{:<40} {:<20} {:>12}",
            table.name,
            table.primary_key,
            table
                .number_of_rows
                .map(|n| n.to_string())
                .unwrap_or_else(|| "?".to_string())
        );
    }
    println!("\n{} table(s) on {}", tables.len(), source);

    Ok(())
}
