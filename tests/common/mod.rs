// ABOUTME: In-memory source and target adapters for orchestrator tests
// ABOUTME: Both record every call in a shared journal with timestamps

#![allow(dead_code)]

use async_trait::async_trait;
use datda::error::Result;
use datda::{Adapter, Direction, FieldValue, MigrationError, RowRecord, StoreKind, TableDescriptor};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub enum Event {
    Connect(Direction),
    Close(Direction),
    GetTables,
    Count(String),
    GetRows {
        table: String,
        limit: u64,
        offset: u64,
        at: Instant,
    },
    Insert {
        table: String,
        rows: Vec<RowRecord>,
        at: Instant,
    },
}

#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Event>>>);

impl Journal {
    pub fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn fetches(&self) -> Vec<(String, u64, u64)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::GetRows {
                    table,
                    limit,
                    offset,
                    ..
                } => Some((table, offset, limit)),
                _ => None,
            })
            .collect()
    }

    pub fn inserted(&self, table: &str) -> Vec<RowRecord> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Insert { table: t, rows, .. } if t == table => Some(rows),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn closed(&self, direction: Direction) -> bool {
        self.events()
            .iter()
            .any(|e| matches!(e, Event::Close(d) if *d == direction))
    }
}

/// Rows `0..count` with `id` and `n` fields.
pub fn numbered_rows(count: usize) -> Vec<RowRecord> {
    (0..count)
        .map(|i| {
            let mut row = RowRecord::new();
            row.insert("id".to_string(), FieldValue::from(format!("r{}", i)));
            row.insert("n".to_string(), FieldValue::from(i as i64));
            row
        })
        .collect()
}

pub struct MockSource {
    pub journal: Journal,
    pub tables: Vec<(String, Vec<RowRecord>)>,
    /// Reported row count wins over the real number of rows
    pub count_override: BTreeMap<String, u64>,
    pub fail_get_tables: bool,
    /// Export mapping rejects the row whose `n` field equals this value
    pub fail_export_of: Option<i64>,
}

impl MockSource {
    pub fn new(journal: Journal, tables: Vec<(&str, Vec<RowRecord>)>) -> Self {
        Self {
            journal,
            tables: tables
                .into_iter()
                .map(|(name, rows)| (name.to_string(), rows))
                .collect(),
            count_override: BTreeMap::new(),
            fail_get_tables: false,
            fail_export_of: None,
        }
    }

    fn rows(&self, table: &str) -> &[RowRecord] {
        self.tables
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, rows)| rows.as_slice())
            .unwrap_or(&[])
    }
}

#[async_trait]
impl Adapter for MockSource {
    fn kind(&self) -> StoreKind {
        StoreKind::Sqlite
    }

    fn direction(&self) -> Direction {
        Direction::Source
    }

    async fn connect(&mut self) -> Result<()> {
        self.journal.push(Event::Connect(Direction::Source));
        Ok(())
    }

    async fn close_connection(&mut self) {
        self.journal.push(Event::Close(Direction::Source));
    }

    async fn get_tables(&mut self) -> Result<Vec<TableDescriptor>> {
        self.journal.push(Event::GetTables);
        if self.fail_get_tables {
            return Err(MigrationError::discovery(
                StoreKind::Sqlite,
                anyhow::anyhow!("disk I/O error"),
            ));
        }
        Ok(self
            .tables
            .iter()
            .map(|(name, _)| TableDescriptor::new(name.clone(), "id"))
            .collect())
    }

    async fn get_number_of_rows(&mut self, table: &TableDescriptor) -> Result<u64> {
        self.journal.push(Event::Count(table.name.clone()));
        Ok(self
            .count_override
            .get(&table.name)
            .copied()
            .unwrap_or(self.rows(&table.name).len() as u64))
    }

    async fn get_rows(
        &mut self,
        table: &TableDescriptor,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<RowRecord>> {
        self.journal.push(Event::GetRows {
            table: table.name.clone(),
            limit,
            offset,
            at: Instant::now(),
        });
        let rows = self.rows(&table.name);
        let start = (offset as usize).min(rows.len());
        let end = (start + limit as usize).min(rows.len());
        Ok(rows[start..end].to_vec())
    }

    fn map_exported_row(&self, table: &TableDescriptor, mut row: RowRecord) -> Result<RowRecord> {
        if let Some(n) = self.fail_export_of {
            if row.get("n") == Some(&FieldValue::from(n)) {
                return Err(MigrationError::mapping(
                    &table.name,
                    anyhow::anyhow!("unsupported value in row {}", n),
                ));
            }
        }
        row.insert("exported".to_string(), FieldValue::Bool(true));
        Ok(row)
    }
}

pub struct MockTarget {
    pub journal: Journal,
    /// 1-based insert call that fails
    pub fail_on_insert: Option<usize>,
    /// 1-based insert call that cancels the token before returning
    pub cancel_on_insert: Option<(usize, CancellationToken)>,
    /// Reject rows the mock source did not export-map
    pub check_export_mapping: bool,
    inserts: usize,
}

impl MockTarget {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            fail_on_insert: None,
            cancel_on_insert: None,
            check_export_mapping: true,
            inserts: 0,
        }
    }
}

#[async_trait]
impl Adapter for MockTarget {
    fn kind(&self) -> StoreKind {
        StoreKind::Mongodb
    }

    fn direction(&self) -> Direction {
        Direction::Target
    }

    async fn connect(&mut self) -> Result<()> {
        self.journal.push(Event::Connect(Direction::Target));
        Ok(())
    }

    async fn close_connection(&mut self) {
        self.journal.push(Event::Close(Direction::Target));
    }

    async fn get_tables(&mut self) -> Result<Vec<TableDescriptor>> {
        Ok(Vec::new())
    }

    async fn get_number_of_rows(&mut self, _table: &TableDescriptor) -> Result<u64> {
        Ok(0)
    }

    /// Rejects rows that skipped the source's export mapping.
    fn map_imported_row(&self, table: &TableDescriptor, mut row: RowRecord) -> Result<RowRecord> {
        if self.check_export_mapping && row.get("exported") != Some(&FieldValue::Bool(true)) {
            return Err(MigrationError::mapping(
                &table.name,
                anyhow::anyhow!("row was not export-mapped first"),
            ));
        }
        row.insert("imported".to_string(), FieldValue::Bool(true));
        Ok(row)
    }

    async fn insert_rows(&mut self, table: &TableDescriptor, rows: Vec<RowRecord>) -> Result<()> {
        self.inserts += 1;
        if self.fail_on_insert == Some(self.inserts) {
            return Err(MigrationError::insert(
                &table.name,
                anyhow::anyhow!("duplicate key value"),
            ));
        }
        self.journal.push(Event::Insert {
            table: table.name.clone(),
            rows,
            at: Instant::now(),
        });
        if let Some((call, ref token)) = self.cancel_on_insert {
            if call == self.inserts {
                token.cancel();
            }
        }
        Ok(())
    }
}
