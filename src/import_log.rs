// ABOUTME: Run log accumulation and optional mirroring to an external sink
// ABOUTME: Records timestamped entries and per-table statistics for one migration run

use crate::row::TableDescriptor;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// One timestamped log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} : {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.message
        )
    }
}

/// Statistics for one discovered table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    pub name: String,
    pub primary_key: String,
    /// Set once the table's count query ran
    pub number_of_rows: Option<u64>,
    pub rows_inserted: u64,
    pub rows_skipped: u64,
    pub batches: u64,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Running,
    Completed,
    Cancelled,
    Failed,
}

/// The run's accumulated progress record, handed to the caller once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportLog {
    pub status: RunStatus,
    pub logs: Vec<LogEntry>,
    pub tables: BTreeMap<String, TableStats>,
}

impl ImportLog {
    pub fn is_cancelled(&self) -> bool {
        self.status == RunStatus::Cancelled
    }

    pub fn table(&self, name: &str) -> Option<&TableStats> {
        self.tables.get(name)
    }

    /// Log messages without timestamps, in order.
    pub fn messages(&self) -> Vec<&str> {
        self.logs.iter().map(|e| e.message.as_str()).collect()
    }

    pub fn total_rows_inserted(&self) -> u64 {
        self.tables.values().map(|t| t.rows_inserted).sum()
    }
}

/// External destination for log entries and progress.
pub trait LogSink: Send + Sync {
    fn record(&self, entry: &LogEntry);

    /// Called after each inserted batch.
    fn progress(&self, _table: &str, _rows_done: u64, _rows_total: u64) {}

    /// Called when a table's pagination loop ends.
    fn table_finished(&self, _table: &str) {}
}

/// Mirrors entries into `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn record(&self, entry: &LogEntry) {
        tracing::info!("mtr : {}", entry);
    }
}

/// Single owner of a run's [`ImportLog`].
pub struct LogRecorder {
    log: ImportLog,
    sink: Option<Arc<dyn LogSink>>,
    mirror_entries: bool,
}

impl LogRecorder {
    /// `mirror_entries` controls whether log lines reach the sink; progress
    /// notifications are delivered whenever a sink is present.
    pub fn new(sink: Option<Arc<dyn LogSink>>, mirror_entries: bool) -> Self {
        Self {
            log: ImportLog::default(),
            sink,
            mirror_entries,
        }
    }

    pub fn log(&mut self, message: impl Into<String>) {
        let entry = LogEntry {
            timestamp: Utc::now(),
            message: message.into(),
        };
        tracing::debug!("{}", entry.message);
        if self.mirror_entries {
            if let Some(ref sink) = self.sink {
                sink.record(&entry);
            }
        }
        self.log.logs.push(entry);
    }

    /// Add every discovered table, before filtering, to the statistics map.
    pub fn register_tables(&mut self, tables: &[TableDescriptor]) {
        for table in tables {
            self.log.tables.insert(
                table.name.clone(),
                TableStats {
                    name: table.name.clone(),
                    primary_key: table.primary_key.clone(),
                    number_of_rows: table.number_of_rows,
                    ..Default::default()
                },
            );
        }
    }

    pub fn set_row_count(&mut self, table: &TableDescriptor, number_of_rows: u64) {
        self.stats_mut(table).number_of_rows = Some(number_of_rows);
    }

    pub fn record_batch(&mut self, table: &TableDescriptor, inserted: u64, skipped: u64) {
        let stats = self.stats_mut(table);
        stats.rows_inserted += inserted;
        stats.rows_skipped += skipped;
        stats.batches += 1;
    }

    pub fn progress(&self, table: &str, rows_done: u64, rows_total: u64) {
        if let Some(ref sink) = self.sink {
            sink.progress(table, rows_done, rows_total);
        }
    }

    pub fn table_finished(&self, table: &str) {
        if let Some(ref sink) = self.sink {
            sink.table_finished(table);
        }
    }

    /// Close the log with its final status and hand it over.
    pub fn finish(mut self, status: RunStatus) -> ImportLog {
        self.log.status = status;
        self.log
    }

    fn stats_mut(&mut self, table: &TableDescriptor) -> &mut TableStats {
        self.log
            .tables
            .entry(table.name.clone())
            .or_insert_with(|| TableStats {
                name: table.name.clone(),
                primary_key: table.primary_key.clone(),
                ..Default::default()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CollectingSink {
        entries: Mutex<Vec<String>>,
        progress: Mutex<Vec<(String, u64, u64)>>,
    }

    impl LogSink for CollectingSink {
        fn record(&self, entry: &LogEntry) {
            self.entries.lock().unwrap().push(entry.message.clone());
        }

        fn progress(&self, table: &str, rows_done: u64, rows_total: u64) {
            self.progress
                .lock()
                .unwrap()
                .push((table.to_string(), rows_done, rows_total));
        }
    }

    #[test]
    fn test_entries_are_appended_in_order() {
        let mut recorder = LogRecorder::new(None, false);
        recorder.log("Connecting To Source DB");
        recorder.log("Connecting to Target DB");
        let log = recorder.finish(RunStatus::Completed);
        assert_eq!(
            log.messages(),
            vec!["Connecting To Source DB", "Connecting to Target DB"]
        );
        assert!(log.logs[0].timestamp <= log.logs[1].timestamp);
        assert_eq!(log.status, RunStatus::Completed);
    }

    #[test]
    fn test_sink_mirroring_follows_flag() {
        let sink = Arc::new(CollectingSink::default());

        let mut quiet = LogRecorder::new(Some(sink.clone()), false);
        quiet.log("hidden");
        quiet.progress("users", 10, 20);
        assert!(sink.entries.lock().unwrap().is_empty());
        assert_eq!(sink.progress.lock().unwrap().len(), 1);

        let mut loud = LogRecorder::new(Some(sink.clone()), true);
        loud.log("shown");
        assert_eq!(*sink.entries.lock().unwrap(), vec!["shown".to_string()]);
    }

    #[test]
    fn test_table_statistics() {
        let mut recorder = LogRecorder::new(None, false);
        let users = TableDescriptor::new("users", "id");
        let posts = TableDescriptor::new("posts", "post_id");
        recorder.register_tables(&[users.clone(), posts]);
        recorder.set_row_count(&users, 23);
        recorder.record_batch(&users, 10, 0);
        recorder.record_batch(&users, 9, 1);

        let log = recorder.finish(RunStatus::Completed);
        let stats = log.table("users").unwrap();
        assert_eq!(stats.number_of_rows, Some(23));
        assert_eq!(stats.rows_inserted, 19);
        assert_eq!(stats.rows_skipped, 1);
        assert_eq!(stats.batches, 2);

        let posts = log.table("posts").unwrap();
        assert_eq!(posts.primary_key, "post_id");
        assert_eq!(posts.number_of_rows, None);
        assert_eq!(log.total_rows_inserted(), 19);
    }

    #[test]
    fn test_log_serializes_to_json() {
        let mut recorder = LogRecorder::new(None, false);
        recorder.log("Import Completed");
        let log = recorder.finish(RunStatus::Cancelled);
        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json["status"], "cancelled");
        assert_eq!(json["logs"][0]["message"], "Import Completed");
    }

    #[test]
    fn test_entry_display() {
        let entry = LogEntry {
            timestamp: DateTime::parse_from_rfc3339("2020-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            message: "Import Completed".to_string(),
        };
        assert_eq!(entry.to_string(), "2020-01-01T00:00:00.000Z : Import Completed");
    }
}
