// ABOUTME: Adapter contract every store driver implements
// ABOUTME: Store identifiers, direction capability flags and adapter construction

use crate::config::StoreSettings;
use crate::error::{MigrationError, Result};
use crate::row::{RowRecord, TableDescriptor};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which side of a migration an adapter serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Source,
    Target,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Source => write!(f, "source"),
            Direction::Target => write!(f, "target"),
        }
    }
}

/// Directions a store can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub source: bool,
    pub target: bool,
}

impl Capabilities {
    pub fn supports(&self, direction: Direction) -> bool {
        match direction {
            Direction::Source => self.source,
            Direction::Target => self.target,
        }
    }
}

/// Identifier of a supported store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Sqlite,
    Mysql,
    Postgres,
    Mongodb,
    Dynamodb,
}

impl StoreKind {
    pub const ALL: [StoreKind; 5] = [
        StoreKind::Sqlite,
        StoreKind::Mysql,
        StoreKind::Postgres,
        StoreKind::Mongodb,
        StoreKind::Dynamodb,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Sqlite => "sqlite",
            StoreKind::Mysql => "mysql",
            StoreKind::Postgres => "postgres",
            StoreKind::Mongodb => "mongodb",
            StoreKind::Dynamodb => "dynamodb",
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        match self {
            StoreKind::Sqlite | StoreKind::Mongodb => Capabilities {
                source: true,
                target: true,
            },
            StoreKind::Mysql => Capabilities {
                source: true,
                target: false,
            },
            StoreKind::Postgres | StoreKind::Dynamodb => Capabilities {
                source: false,
                target: true,
            },
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreKind {
    type Err = MigrationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "sqlite" | "sqlite3" => Ok(StoreKind::Sqlite),
            "mysql" => Ok(StoreKind::Mysql),
            "postgres" | "postgresql" => Ok(StoreKind::Postgres),
            "mongodb" | "mongo" => Ok(StoreKind::Mongodb),
            "dynamodb" | "dynamo" => Ok(StoreKind::Dynamodb),
            _ => Err(MigrationError::config(format!(
                "Unknown store '{}'. Expected one of: {}",
                s,
                StoreKind::ALL.map(|k| k.as_str()).join(", ")
            ))),
        }
    }
}

/// Contract between the orchestrator and a store driver.
///
/// An adapter owns exactly one connection for the lifetime of a run. The
/// orchestrator drives it strictly sequentially, so implementations never
/// see two calls in flight at once.
///
/// Capabilities a store cannot offer keep their default implementation,
/// which fails with [`MigrationError::NotImplemented`].
#[async_trait]
pub trait Adapter: Send {
    fn kind(&self) -> StoreKind;

    fn direction(&self) -> Direction;

    /// Establish the connection. Calling it again while connected is a no-op.
    async fn connect(&mut self) -> Result<()>;

    /// Release the connection. Safe to call repeatedly and after a failed
    /// `connect`; driver errors are logged, never returned.
    async fn close_connection(&mut self);

    /// Enumerate tables visible to this adapter and resolve their primary keys.
    async fn get_tables(&mut self) -> Result<Vec<TableDescriptor>>;

    /// Best-effort row count.
    async fn get_number_of_rows(&mut self, table: &TableDescriptor) -> Result<u64>;

    /// Up to `limit` rows starting at `offset`, in a stable order.
    async fn get_rows(
        &mut self,
        _table: &TableDescriptor,
        _limit: u64,
        _offset: u64,
    ) -> Result<Vec<RowRecord>> {
        Err(MigrationError::not_implemented(self.kind(), "getRows"))
    }

    /// Normalize a row read from this store.
    fn map_exported_row(&self, _table: &TableDescriptor, _row: RowRecord) -> Result<RowRecord> {
        Err(MigrationError::not_implemented(self.kind(), "mapExportedRow"))
    }

    /// Normalize a row before it is written to this store.
    fn map_imported_row(&self, _table: &TableDescriptor, row: RowRecord) -> Result<RowRecord> {
        Ok(row)
    }

    /// Upsert a batch by primary key. Any row the store rejects fails the
    /// whole call.
    async fn insert_rows(&mut self, _table: &TableDescriptor, _rows: Vec<RowRecord>) -> Result<()> {
        Err(MigrationError::not_implemented(self.kind(), "insertRows"))
    }
}

/// Instantiate the adapter for `kind` in `direction`.
///
/// Direction support is checked before anything store-specific happens;
/// no connection is opened here.
pub fn build_adapter(
    kind: StoreKind,
    direction: Direction,
    settings: &StoreSettings,
) -> Result<Box<dyn Adapter>> {
    if !kind.capabilities().supports(direction) {
        return Err(MigrationError::UnsupportedDirection {
            store: kind,
            direction,
        });
    }

    let missing = || {
        MigrationError::config(format!(
            "Missing [{}] connection settings for the migration {}",
            kind, direction
        ))
    };

    let adapter: Box<dyn Adapter> = match kind {
        StoreKind::Sqlite => {
            let cfg = settings.sqlite.as_ref().ok_or_else(missing)?;
            Box::new(crate::sqlite::SqliteAdapter::new(cfg, direction)?)
        }
        StoreKind::Mysql => {
            let cfg = settings.mysql.as_ref().ok_or_else(missing)?;
            Box::new(crate::mysql::MysqlAdapter::new(cfg)?)
        }
        StoreKind::Postgres => {
            let cfg = settings.postgres.as_ref().ok_or_else(missing)?;
            Box::new(crate::postgres::PostgresAdapter::new(cfg)?)
        }
        StoreKind::Mongodb => {
            let cfg = settings.mongodb.as_ref().ok_or_else(missing)?;
            Box::new(crate::mongodb::MongoAdapter::new(cfg, direction)?)
        }
        StoreKind::Dynamodb => {
            let cfg = settings.dynamodb.as_ref().ok_or_else(missing)?;
            Box::new(crate::dynamodb::DynamoAdapter::new(cfg))
        }
    };

    tracing::debug!("Instantiated {} adapter as {}", kind, direction);

    Ok(adapter)
}
