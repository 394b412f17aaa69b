// ABOUTME: Error taxonomy for migration runs
// ABOUTME: Classifies failures by phase and carries the partial log on failure

use crate::adapter::{Direction, StoreKind};
use crate::import_log::ImportLog;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MigrationError>;

/// Every way a migration run can fail.
///
/// Store adapters build their errors with `anyhow` context chains and
/// classify them here at the adapter boundary, so callers can tell a bad
/// option from an unreachable server from a rejected batch.
#[derive(Error, Debug)]
pub enum MigrationError {
    /// Invalid option value, or `source == target`.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A store was asked to act in a direction it cannot serve.
    #[error("{store} cannot be used as a migration {direction}")]
    UnsupportedDirection {
        store: StoreKind,
        direction: Direction,
    },

    #[error("Failed to connect to {store}: {cause:#}")]
    Connection {
        store: StoreKind,
        cause: anyhow::Error,
    },

    #[error("Failed to discover tables on {store}: {cause:#}")]
    Discovery {
        store: StoreKind,
        cause: anyhow::Error,
    },

    #[error("Failed to read from table '{table}': {cause:#}")]
    Fetch { table: String, cause: anyhow::Error },

    #[error("Failed to map row of table '{table}': {cause:#}")]
    Mapping { table: String, cause: anyhow::Error },

    #[error("Failed to insert into table '{table}': {cause:#}")]
    Insert { table: String, cause: anyhow::Error },

    /// The adapter does not implement this capability at all.
    #[error("{store} does not implement {operation}")]
    NotImplemented {
        store: StoreKind,
        operation: &'static str,
    },
}

impl MigrationError {
    pub fn config(message: impl Into<String>) -> Self {
        MigrationError::Configuration(message.into())
    }

    pub fn connection(store: StoreKind, cause: impl Into<anyhow::Error>) -> Self {
        MigrationError::Connection {
            store,
            cause: cause.into(),
        }
    }

    pub fn discovery(store: StoreKind, cause: impl Into<anyhow::Error>) -> Self {
        MigrationError::Discovery {
            store,
            cause: cause.into(),
        }
    }

    pub fn fetch(table: impl Into<String>, cause: impl Into<anyhow::Error>) -> Self {
        MigrationError::Fetch {
            table: table.into(),
            cause: cause.into(),
        }
    }

    pub fn mapping(table: impl Into<String>, cause: impl Into<anyhow::Error>) -> Self {
        MigrationError::Mapping {
            table: table.into(),
            cause: cause.into(),
        }
    }

    pub fn insert(table: impl Into<String>, cause: impl Into<anyhow::Error>) -> Self {
        MigrationError::Insert {
            table: table.into(),
            cause: cause.into(),
        }
    }

    pub fn not_implemented(store: StoreKind, operation: &'static str) -> Self {
        MigrationError::NotImplemented { store, operation }
    }

    /// True for errors raised before any connection was attempted.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            MigrationError::Configuration(_) | MigrationError::UnsupportedDirection { .. }
        )
    }
}

/// A failed run: the originating error plus everything logged up to it.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct MigrationFailure {
    #[source]
    pub error: MigrationError,
    pub log: ImportLog,
}

impl MigrationFailure {
    pub fn new(error: MigrationError, log: ImportLog) -> Self {
        Self { error, log }
    }
}
