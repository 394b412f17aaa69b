// ABOUTME: Migration options, per-store connection settings and their validation
// ABOUTME: Parses TOML config files and applies defaults before a run starts

use crate::adapter::StoreKind;
use crate::dynamodb::DynamoSettings;
use crate::error::{MigrationError, Result};
use crate::mongodb::MongoSettings;
use crate::mysql::{extract_database_name, MysqlSettings};
use crate::postgres::PostgresSettings;
use crate::sqlite::SqliteSettings;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::time::Duration;

pub const DEFAULT_ROWS_PER_BATCH: u64 = 10_000;

fn default_rows_per_batch() -> u64 {
    DEFAULT_ROWS_PER_BATCH
}

/// Per-table overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Starting offset for this table; wins over the global `row_offset`
    #[serde(default)]
    pub row_offset: Option<u64>,
    /// Rows missing any of these fields are skipped instead of inserted
    #[serde(default)]
    pub required_fields: Vec<String>,
}

/// Connection settings, one optional section per store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default)]
    pub sqlite: Option<SqliteSettings>,
    #[serde(default)]
    pub mysql: Option<MysqlSettings>,
    #[serde(default)]
    pub postgres: Option<PostgresSettings>,
    #[serde(default)]
    pub mongodb: Option<MongoSettings>,
    #[serde(default)]
    pub dynamodb: Option<DynamoSettings>,
}

/// Everything a run needs. Validated once, immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationOptions {
    pub source: StoreKind,
    pub target: StoreKind,
    /// Database name shared by stores that did not set their own
    #[serde(default)]
    pub db: Option<String>,
    #[serde(default)]
    pub whitelist: Vec<String>,
    #[serde(default)]
    pub blacklist: Vec<String>,
    #[serde(default = "default_rows_per_batch")]
    pub rows_per_batch: u64,
    #[serde(default)]
    pub row_offset: u64,
    #[serde(default)]
    pub insertion_latency_ms: u64,
    #[serde(default)]
    pub log: bool,
    #[serde(default)]
    pub table_config: BTreeMap<String, TableConfig>,
    #[serde(flatten)]
    pub stores: StoreSettings,
}

impl MigrationOptions {
    /// Options with every default applied and no store settings.
    pub fn new(source: StoreKind, target: StoreKind) -> Self {
        Self {
            source,
            target,
            db: None,
            whitelist: Vec::new(),
            blacklist: Vec::new(),
            rows_per_batch: DEFAULT_ROWS_PER_BATCH,
            row_offset: 0,
            insertion_latency_ms: 0,
            log: false,
            table_config: BTreeMap::new(),
            stores: StoreSettings::default(),
        }
    }

    /// Check every option and fill in store defaults.
    ///
    /// Runs before any adapter is constructed, so a rejected configuration
    /// never opens a connection.
    pub fn validate(mut self) -> Result<Self> {
        if self.source == self.target {
            return Err(MigrationError::config(format!(
                "`source` and `target` cannot be the same (both are '{}')",
                self.source
            )));
        }

        if self.rows_per_batch == 0 {
            return Err(MigrationError::config(
                "`rows_per_batch` must be a positive integer",
            ));
        }

        check_table_names("whitelist", &self.whitelist)?;
        check_table_names("blacklist", &self.blacklist)?;

        for (table, table_config) in &self.table_config {
            if table.trim().is_empty() {
                return Err(MigrationError::config(
                    "`table_config` contains an empty table name",
                ));
            }
            if table_config
                .required_fields
                .iter()
                .any(|f| f.trim().is_empty())
            {
                return Err(MigrationError::config(format!(
                    "`table_config.{}.required_fields` contains an empty field name",
                    table
                )));
            }
        }

        if let Some(ref mut mongo) = self.stores.mongodb {
            if mongo.database.is_none() {
                mongo.database = self.db.clone();
            }
        }
        if let Some(ref mut mysql) = self.stores.mysql {
            if mysql.database.is_none() && extract_database_name(&mysql.url).is_none() {
                mysql.database = self.db.clone();
            }
        }
        if let Some(ref mut postgres) = self.stores.postgres {
            if postgres.source_type.is_none() {
                postgres.source_type = Some(self.source.to_string());
            }
        }

        Ok(self)
    }

    pub fn insertion_latency(&self) -> Duration {
        Duration::from_millis(self.insertion_latency_ms)
    }

    /// Starting offset for `table`: the per-table override when present,
    /// otherwise the global offset.
    pub fn start_offset(&self, table: &str) -> u64 {
        self.table_config
            .get(table)
            .and_then(|c| c.row_offset)
            .unwrap_or(self.row_offset)
    }

    pub fn required_fields(&self, table: &str) -> &[String] {
        self.table_config
            .get(table)
            .map(|c| c.required_fields.as_slice())
            .unwrap_or(&[])
    }
}

fn check_table_names(option: &str, names: &[String]) -> Result<()> {
    if names.iter().any(|n| n.trim().is_empty()) {
        return Err(MigrationError::config(format!(
            "`{}` must not contain empty table names",
            option
        )));
    }
    Ok(())
}

/// Parse options from TOML text. Validation is a separate step.
pub fn parse_options(raw: &str) -> anyhow::Result<MigrationOptions> {
    toml::from_str(raw).context("Failed to parse migration options")
}

/// Read and parse a TOML options file.
pub fn load_options_from_file(path: &str) -> anyhow::Result<MigrationOptions> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path))?;
    toml::from_str(&raw).with_context(|| format!("Failed to parse TOML config at {}", path))
}
