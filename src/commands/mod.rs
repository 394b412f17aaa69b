// ABOUTME: Command implementations behind the CLI subcommands
// ABOUTME: Exports migrate and tables plus the terminal progress sink

pub mod migrate;
pub mod progress;
pub mod tables;

pub use migrate::{migrate, MigrateOverrides};
pub use progress::ProgressSink;
pub use tables::tables;
