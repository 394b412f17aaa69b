// ABOUTME: CLI entry point for datda
// ABOUTME: Parses commands and routes to appropriate handlers

use clap::{Parser, Subcommand};
use datda::commands::{self, MigrateOverrides, ProgressSink};
use datda::StoreKind;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "datda")]
#[command(about = "Batch table migration between heterogeneous data stores", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy every selected table from the source store into the target store
    Migrate {
        /// TOML file with migration options and store settings
        #[arg(long, default_value = "datda.toml")]
        config: String,
        /// Source store (sqlite, mysql, mongodb)
        #[arg(long)]
        source: Option<StoreKind>,
        /// Target store (sqlite, mongodb, postgres, dynamodb)
        #[arg(long)]
        target: Option<StoreKind>,
        /// Migrate only these tables (comma-separated)
        #[arg(long, value_delimiter = ',')]
        whitelist: Option<Vec<String>>,
        /// Skip these tables (comma-separated)
        #[arg(long, value_delimiter = ',')]
        blacklist: Option<Vec<String>>,
        /// Maximum rows fetched and inserted per batch
        #[arg(long)]
        rows_per_batch: Option<u64>,
        /// Starting row offset for every table
        #[arg(long)]
        row_offset: Option<u64>,
        /// Pause after each batch and table, in milliseconds
        #[arg(long)]
        insertion_latency: Option<u64>,
        /// Print every log entry
        #[arg(long)]
        log: bool,
        /// Write the import log as JSON to this file
        #[arg(long)]
        log_output: Option<PathBuf>,
    },
    /// List the source tables a migration would copy
    Tables {
        #[arg(long, default_value = "datda.toml")]
        config: String,
    },
}

/// Cancel `token` on the first Ctrl-C.
fn setup_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received Ctrl-C. Finishing the current operation and closing connections...");
            cancel.cancel();
        }
    });

    token
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging - default to INFO level if RUST_LOG not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Migrate {
            config,
            source,
            target,
            whitelist,
            blacklist,
            rows_per_batch,
            row_offset,
            insertion_latency,
            log,
            log_output,
        } => {
            let overrides = MigrateOverrides {
                source,
                target,
                whitelist,
                blacklist,
                rows_per_batch,
                row_offset,
                insertion_latency_ms: insertion_latency,
                log,
            };
            let cancel = setup_signal_handler();
            commands::migrate(
                &config,
                overrides,
                log_output.as_deref(),
                cancel,
                Arc::new(ProgressSink::new()),
            )
            .await
        }
        Commands::Tables { config } => commands::tables(&config).await,
    }
}
