// ABOUTME: Migrate command: load options, apply CLI overrides and run the migration
// ABOUTME: Writes the import log as JSON even when the run fails

use crate::adapter::StoreKind;
use crate::config::{load_options_from_file, MigrationOptions};
use crate::import_log::{ImportLog, LogSink, RunStatus};
use crate::orchestrator;
use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Command-line values that win over the config file.
#[derive(Debug, Clone, Default)]
pub struct MigrateOverrides {
    pub source: Option<StoreKind>,
    pub target: Option<StoreKind>,
    pub whitelist: Option<Vec<String>>,
    pub blacklist: Option<Vec<String>>,
    pub rows_per_batch: Option<u64>,
    pub row_offset: Option<u64>,
    pub insertion_latency_ms: Option<u64>,
    pub log: bool,
}

impl MigrateOverrides {
    pub fn apply(self, options: &mut MigrationOptions) {
        if let Some(source) = self.source {
            options.source = source;
        }
        if let Some(target) = self.target {
            options.target = target;
        }
        if let Some(whitelist) = self.whitelist {
            options.whitelist = whitelist;
        }
        if let Some(blacklist) = self.blacklist {
            options.blacklist = blacklist;
        }
        if let Some(rows_per_batch) = self.rows_per_batch {
            options.rows_per_batch = rows_per_batch;
        }
        if let Some(row_offset) = self.row_offset {
            options.row_offset = row_offset;
        }
        if let Some(latency) = self.insertion_latency_ms {
            options.insertion_latency_ms = latency;
        }
        options.log |= self.log;
    }
}

/// Run a migration from a config file
///
/// # Arguments
///
/// * `config_path` - TOML file with the migration options
/// * `overrides` - Values from the command line
/// * `log_output` - Optional path for the JSON import log
/// * `cancel` - Token cancelled on Ctrl-C
/// * `sink` - Receives log entries and per-batch progress
///
/// # Errors
///
/// Fails when the config cannot be loaded, when the run fails, or when it
/// is cancelled. The import log is written before any run error is returned.
pub async fn migrate(
    config_path: &str,
    overrides: MigrateOverrides,
    log_output: Option<&Path>,
    cancel: CancellationToken,
    sink: Arc<dyn LogSink>,
) -> Result<()> {
    let mut options = load_options_from_file(config_path)?;
    overrides.apply(&mut options);

    tracing::info!(
        "Migrating {} → {} ({} rows per batch)",
        options.source,
        options.target,
        options.rows_per_batch
    );

    let outcome = orchestrator::migrate(options, cancel, Some(sink)).await;

    let log = match &outcome {
        Ok(log) => log,
        Err(failure) => &failure.log,
    };
    if let Some(path) = log_output {
        write_import_log(log, path)?;
    }
    print_summary(log);

    match outcome {
        Ok(log) if log.status == RunStatus::Cancelled => bail!("Migration cancelled"),
        Ok(_) => Ok(()),
        Err(failure) if failure.error.is_validation() => {
            Err(failure.error).context("Invalid migration options")
        }
        Err(failure) => Err(failure.error).context("Migration failed"),
    }
}

/// Serialize the import log to `path` as pretty JSON.
pub fn write_import_log(log: &ImportLog, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(log).context("Failed to serialize import log")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write import log to {}", path.display()))?;
    tracing::info!("Import log written to {}", path.display());
    Ok(())
}

fn print_summary(log: &ImportLog) {
    for stats in log.tables.values() {
        if stats.batches == 0 {
            continue;
        }
        tracing::info!(
            "  {}: {} inserted, {} skipped in {} batch(es)",
            stats.name,
            stats.rows_inserted,
            stats.rows_skipped,
            stats.batches
        );
    }
    tracing::info!(
        "Run {:?}: {} row(s) inserted",
        log.status,
        log.total_rows_inserted()
    );
}
