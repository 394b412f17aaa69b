// ABOUTME: Terminal progress bars fed by the migration log recorder
// ABOUTME: One bar per table, log entries printed above the bars

use crate::import_log::{LogEntry, LogSink};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::Mutex;

/// [`LogSink`] rendering per-table progress bars with `indicatif`.
#[derive(Default)]
pub struct ProgressSink {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl ProgressSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn bar_for(&self, table: &str, total: u64) -> Option<ProgressBar> {
        let mut bars = self.bars.lock().ok()?;
        let bar = bars.entry(table.to_string()).or_insert_with(|| {
            let bar = self.multi.add(ProgressBar::new(total));
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{prefix:>20} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            bar.set_prefix(table.to_string());
            bar
        });
        Some(bar.clone())
    }
}

impl LogSink for ProgressSink {
    fn record(&self, entry: &LogEntry) {
        // Hidden targets (no terminal) swallow println output
        if self.multi.is_hidden() || self.multi.println(format!("mtr : {}", entry)).is_err() {
            tracing::info!("mtr : {}", entry);
        }
    }

    fn progress(&self, table: &str, rows_done: u64, rows_total: u64) {
        if let Some(bar) = self.bar_for(table, rows_total) {
            bar.set_length(rows_total);
            bar.set_position(rows_done);
        }
    }

    fn table_finished(&self, table: &str) {
        if let Ok(mut bars) = self.bars.lock() {
            if let Some(bar) = bars.remove(table) {
                bar.finish();
            }
        }
    }
}
