// ABOUTME: Library module for datda
// ABOUTME: Exports the migration engine, store adapters and CLI commands

pub mod adapter;
pub mod commands;
pub mod config;
pub mod dynamodb;
pub mod error;
pub mod filters;
pub mod import_log;
pub mod mongodb;
pub mod mysql;
pub mod orchestrator;
pub mod postgres;
pub mod row;
pub mod sqlite;
pub mod throttle;
pub mod utils;

pub use adapter::{build_adapter, Adapter, Direction, StoreKind};
pub use config::{MigrationOptions, TableConfig};
pub use error::{MigrationError, MigrationFailure};
pub use import_log::{ImportLog, LogSink, RunStatus};
pub use orchestrator::{discover_tables, migrate, Orchestrator};
pub use row::{FieldValue, RowRecord, TableDescriptor};
