// ABOUTME: Migration state machine driving both adapters from connect to close
// ABOUTME: Discovers, filters and paginates tables into the target under the rate limiter

use crate::adapter::{build_adapter, Adapter, Direction};
use crate::config::MigrationOptions;
use crate::error::{MigrationError, MigrationFailure, Result};
use crate::filters::{missing_required_field, TableFilter};
use crate::import_log::{ImportLog, LogRecorder, LogSink, RunStatus, TracingSink};
use crate::row::{RowRecord, TableDescriptor};
use crate::throttle::RateLimiter;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Why the state machine stopped early.
#[derive(Debug)]
enum Halt {
    Cancelled,
    Failed(MigrationError),
}

impl From<MigrationError> for Halt {
    fn from(err: MigrationError) -> Self {
        Halt::Failed(err)
    }
}

/// Run one adapter call as a suspension point that observes cancellation.
async fn guarded<T, F>(cancel: &CancellationToken, operation: F) -> std::result::Result<T, Halt>
where
    F: Future<Output = Result<T>>,
{
    if cancel.is_cancelled() {
        return Err(Halt::Cancelled);
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Halt::Cancelled),
        result = operation => result.map_err(Halt::Failed),
    }
}

/// Drives a single migration run.
///
/// Tables are processed one at a time in listing order, and within a table
/// rows move in non-overlapping, strictly increasing offset ranges. Exactly
/// one adapter call is outstanding at any moment, so at most one batch of
/// rows is held in memory.
pub struct Orchestrator {
    options: MigrationOptions,
    source: Box<dyn Adapter>,
    target: Box<dyn Adapter>,
    filter: TableFilter,
    limiter: RateLimiter,
    recorder: LogRecorder,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// `options` must already be validated.
    pub fn new(
        options: MigrationOptions,
        source: Box<dyn Adapter>,
        target: Box<dyn Adapter>,
    ) -> Self {
        let sink: Option<Arc<dyn LogSink>> = if options.log {
            Some(Arc::new(TracingSink))
        } else {
            None
        };

        Self {
            filter: TableFilter::from_options(&options),
            limiter: RateLimiter::new(options.insertion_latency()),
            recorder: LogRecorder::new(sink, options.log),
            cancel: CancellationToken::new(),
            options,
            source,
            target,
        }
    }

    /// Replace the default sink. Entries are still only mirrored when the
    /// `log` option is set.
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.recorder = LogRecorder::new(Some(sink), self.options.log);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Execute the run.
    ///
    /// Both connections are closed on every exit path. A cancelled run is
    /// not an error: it returns the partial log with status `cancelled`.
    /// A failed run returns the partial log inside [`MigrationFailure`].
    pub async fn run(mut self) -> std::result::Result<ImportLog, MigrationFailure> {
        let outcome = self.drive().await;

        self.close_connections().await;

        match outcome {
            Ok(()) => {
                self.recorder.log("Import Completed");
                Ok(self.recorder.finish(RunStatus::Completed))
            }
            Err(Halt::Cancelled) => {
                tracing::warn!("Migration cancelled, connections closed");
                self.recorder.log("Import Cancelled");
                Ok(self.recorder.finish(RunStatus::Cancelled))
            }
            Err(Halt::Failed(err)) => {
                tracing::error!("Migration failed: {}", err);
                self.recorder.log(format!("Import Failed: {}", err));
                Err(MigrationFailure::new(
                    err,
                    self.recorder.finish(RunStatus::Failed),
                ))
            }
        }
    }

    async fn drive(&mut self) -> std::result::Result<(), Halt> {
        self.recorder.log("Connecting To Source DB");
        guarded(&self.cancel, self.source.connect()).await?;

        self.recorder.log("Connecting to Target DB");
        guarded(&self.cancel, self.target.connect()).await?;

        self.recorder.log("Getting Tables from source database");
        let discovered = guarded(&self.cancel, self.source.get_tables()).await?;
        self.recorder.register_tables(&discovered);

        let discovered_count = discovered.len();
        let tables = self.filter.apply(discovered);
        tracing::info!(
            "Migrating {} of {} discovered table(s)",
            tables.len(),
            discovered_count
        );

        for table in tables {
            self.migrate_table(table).await?;

            if !self.limiter.pause(&self.cancel).await {
                return Err(Halt::Cancelled);
            }
        }

        Ok(())
    }

    async fn migrate_table(&mut self, mut table: TableDescriptor) -> std::result::Result<(), Halt> {
        let total = guarded(&self.cancel, self.source.get_number_of_rows(&table)).await?;
        table.number_of_rows = Some(total);

        self.recorder
            .log(format!("Starting to Insert Rows into `{}`", table.name));
        self.recorder.set_row_count(&table, total);

        let batch = self.options.rows_per_batch;
        let required = self.options.required_fields(&table.name).to_vec();
        let mut offset = self.options.start_offset(&table.name);

        while offset < total {
            let limit = batch.min(total - offset);
            tracing::info!(
                "Table `{}` : Row ({} - {})/{}",
                table.name,
                offset + 1,
                offset + limit,
                total
            );

            let rows = guarded(&self.cancel, self.source.get_rows(&table, limit, offset)).await?;
            if (rows.len() as u64) < limit {
                tracing::debug!(
                    "Table `{}` returned {} of {} requested rows at offset {}",
                    table.name,
                    rows.len(),
                    limit,
                    offset
                );
            }

            let (rows, skipped) = self.remap_rows(&table, rows, &required)?;
            let inserted = rows.len() as u64;
            if !rows.is_empty() {
                guarded(&self.cancel, self.target.insert_rows(&table, rows)).await?;
            }
            self.recorder.record_batch(&table, inserted, skipped);

            offset += batch;
            self.recorder.progress(&table.name, offset.min(total), total);

            if !self.limiter.pause(&self.cancel).await {
                return Err(Halt::Cancelled);
            }
        }

        self.recorder.table_finished(&table.name);
        Ok(())
    }

    /// Export-map, apply the required-field policy, then import-map.
    fn remap_rows(
        &self,
        table: &TableDescriptor,
        rows: Vec<RowRecord>,
        required: &[String],
    ) -> Result<(Vec<RowRecord>, u64)> {
        let mut mapped = Vec::with_capacity(rows.len());
        let mut skipped = 0;

        for row in rows {
            let row = self.source.map_exported_row(table, row)?;

            if let Some(field) = missing_required_field(&row, required) {
                tracing::debug!(
                    "Skipping row of `{}` without required field '{}'",
                    table.name,
                    field
                );
                skipped += 1;
                continue;
            }

            mapped.push(self.target.map_imported_row(table, row)?);
        }

        Ok((mapped, skipped))
    }

    async fn close_connections(&mut self) {
        self.source.close_connection().await;
        self.target.close_connection().await;
    }
}

/// Validate `options`, build both adapters and run the migration.
///
/// Validation and adapter construction happen before any connection is
/// attempted; their errors come back with an empty, failed log.
pub async fn migrate(
    options: MigrationOptions,
    cancel: CancellationToken,
    sink: Option<Arc<dyn LogSink>>,
) -> std::result::Result<ImportLog, MigrationFailure> {
    let prepared = options.validate().and_then(|options| {
        let source = build_adapter(options.source, Direction::Source, &options.stores)?;
        let target = build_adapter(options.target, Direction::Target, &options.stores)?;
        Ok((options, source, target))
    });

    let (options, source, target) = match prepared {
        Ok(prepared) => prepared,
        Err(err) => {
            let mut recorder = LogRecorder::new(None, false);
            recorder.log(format!("Invalid options: {}", err));
            return Err(MigrationFailure::new(
                err,
                recorder.finish(RunStatus::Failed),
            ));
        }
    };

    let mut orchestrator = Orchestrator::new(options, source, target).with_cancellation(cancel);
    if let Some(sink) = sink {
        orchestrator = orchestrator.with_sink(sink);
    }
    orchestrator.run().await
}

/// Connect to the source only and list the tables a run would migrate,
/// with their row counts.
pub async fn discover_tables(options: MigrationOptions) -> Result<Vec<TableDescriptor>> {
    let options = options.validate()?;
    let mut source = build_adapter(options.source, Direction::Source, &options.stores)?;

    let result = discover_with(source.as_mut(), &TableFilter::from_options(&options)).await;
    source.close_connection().await;
    result
}

async fn discover_with(
    source: &mut dyn Adapter,
    filter: &TableFilter,
) -> Result<Vec<TableDescriptor>> {
    source.connect().await?;
    let mut tables = filter.apply(source.get_tables().await?);
    for table in tables.iter_mut() {
        table.number_of_rows = Some(source.get_number_of_rows(table).await?);
    }
    Ok(tables)
}
