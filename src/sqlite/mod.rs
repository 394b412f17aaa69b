// ABOUTME: SQLite adapter serving as migration source or target
// ABOUTME: Provides path validation, read-only/read-write connections and the Adapter impl

pub mod converter;
pub mod reader;
pub mod writer;

use crate::adapter::{Adapter, Direction, StoreKind};
use crate::error::{MigrationError, Result as MigrationResult};
use crate::row::{RowRecord, TableDescriptor, ID_FIELD};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const ALLOWED_EXTENSIONS: [&str; 3] = ["db", "sqlite", "sqlite3"];

/// `[sqlite]` section of the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SqliteSettings {
    /// Database read when sqlite is the source
    #[serde(default)]
    pub source_path: Option<String>,
    /// Database written when sqlite is the target; created if missing
    #[serde(default)]
    pub target_path: Option<String>,
}

/// Validate a SQLite file path to prevent path traversal attacks
///
/// Security checks:
/// - Canonicalizes path to resolve symlinks and relative paths
/// - Verifies file exists and is a regular file (not directory)
/// - Checks file extension is .db, .sqlite, or .sqlite3
///
/// # Examples
///
/// ```no_run
/// # use datda::sqlite::validate_sqlite_path;
/// assert!(validate_sqlite_path("database.db").is_ok());
/// assert!(validate_sqlite_path("../../../etc/passwd").is_err());
/// ```
pub fn validate_sqlite_path(path: &str) -> Result<PathBuf> {
    if path.is_empty() {
        bail!("SQLite file path cannot be empty");
    }

    let canonical = PathBuf::from(path).canonicalize().with_context(|| {
        format!(
            "Failed to resolve SQLite file path '{}'. \
             File may not exist or may not be readable.",
            path
        )
    })?;

    if !canonical.is_file() {
        bail!("Path '{}' is not a regular file (may be a directory)", path);
    }

    check_extension(&canonical, path)?;

    tracing::debug!("Validated SQLite path: {}", canonical.display());

    Ok(canonical)
}

/// Validate a target path, which need not exist yet
///
/// The parent directory must exist and the extension must be one of the
/// SQLite extensions.
pub fn validate_target_path(path: &str) -> Result<PathBuf> {
    if path.is_empty() {
        bail!("SQLite file path cannot be empty");
    }

    let path_buf = PathBuf::from(path);
    if path_buf.is_dir() {
        bail!("Path '{}' is a directory, not a database file", path);
    }

    let parent = match path_buf.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let parent = parent.canonicalize().with_context(|| {
        format!(
            "Parent directory of SQLite target '{}' does not exist",
            path
        )
    })?;

    let file_name = path_buf
        .file_name()
        .with_context(|| format!("SQLite target '{}' has no file name", path))?;
    let resolved = parent.join(file_name);

    check_extension(&resolved, path)?;

    Ok(resolved)
}

fn check_extension(resolved: &Path, original: &str) -> Result<()> {
    match resolved.extension().and_then(|e| e.to_str()) {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext) => Ok(()),
        Some(ext) => bail!(
            "Invalid SQLite file extension '{}'. \
             Must be .db, .sqlite, or .sqlite3",
            ext
        ),
        None => bail!(
            "SQLite file '{}' has no extension. \
             Must be .db, .sqlite, or .sqlite3",
            original
        ),
    }
}

/// Open a SQLite database in read-only mode
///
/// The path is validated first and the connection is checked with a
/// version query before it is returned.
pub fn open_sqlite(path: &str) -> Result<rusqlite::Connection> {
    let canonical = validate_sqlite_path(path)?;

    tracing::info!("Opening SQLite database: {}", canonical.display());

    let conn = rusqlite::Connection::open_with_flags(
        &canonical,
        rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
    )
    .with_context(|| format!("Failed to open SQLite database: {}", canonical.display()))?;

    verify_connection(&conn)?;

    Ok(conn)
}

/// Open (or create) a SQLite database for writing.
pub fn open_sqlite_target(path: &str) -> Result<rusqlite::Connection> {
    let resolved = validate_target_path(path)?;

    tracing::info!("Opening SQLite target database: {}", resolved.display());

    let conn = rusqlite::Connection::open(&resolved)
        .with_context(|| format!("Failed to open SQLite database: {}", resolved.display()))?;

    verify_connection(&conn)?;

    Ok(conn)
}

fn verify_connection(conn: &rusqlite::Connection) -> Result<()> {
    let _version: String = conn
        .query_row("SELECT sqlite_version()", [], |row| row.get(0))
        .context("Failed to query SQLite version (database may be corrupted)")?;
    Ok(())
}

/// SQLite store. Read-only as a source, read-write as a target.
pub struct SqliteAdapter {
    path: String,
    direction: Direction,
    conn: Option<rusqlite::Connection>,
}

impl SqliteAdapter {
    pub fn new(settings: &SqliteSettings, direction: Direction) -> MigrationResult<Self> {
        let (path, key) = match direction {
            Direction::Source => (&settings.source_path, "source_path"),
            Direction::Target => (&settings.target_path, "target_path"),
        };
        let path = path.as_ref().filter(|p| !p.trim().is_empty()).ok_or_else(|| {
            MigrationError::config(format!(
                "`sqlite.{}` is required when sqlite is the migration {}",
                key, direction
            ))
        })?;

        Ok(Self {
            path: path.clone(),
            direction,
            conn: None,
        })
    }

    fn conn(&self) -> Result<&rusqlite::Connection> {
        self.conn
            .as_ref()
            .context("SQLite connection is not open; call connect first")
    }
}

#[async_trait]
impl Adapter for SqliteAdapter {
    fn kind(&self) -> StoreKind {
        StoreKind::Sqlite
    }

    fn direction(&self) -> Direction {
        self.direction
    }

    async fn connect(&mut self) -> MigrationResult<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        let conn = match self.direction {
            Direction::Source => open_sqlite(&self.path),
            Direction::Target => open_sqlite_target(&self.path),
        }
        .map_err(|e| MigrationError::connection(StoreKind::Sqlite, e))?;
        self.conn = Some(conn);
        Ok(())
    }

    async fn close_connection(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err((_, e)) = conn.close() {
                tracing::warn!("Failed to close SQLite database {}: {}", self.path, e);
            }
        }
    }

    async fn get_tables(&mut self) -> MigrationResult<Vec<TableDescriptor>> {
        let discover = || -> Result<Vec<TableDescriptor>> {
            let conn = self.conn()?;
            reader::list_tables(conn)?
                .into_iter()
                .map(|name| -> Result<TableDescriptor> {
                    let pk = reader::detect_primary_key(conn, &name)?;
                    Ok(TableDescriptor::new(name, pk))
                })
                .collect()
        };
        discover().map_err(|e| MigrationError::discovery(StoreKind::Sqlite, e))
    }

    async fn get_number_of_rows(&mut self, table: &TableDescriptor) -> MigrationResult<u64> {
        self.conn()
            .and_then(|conn| reader::get_table_row_count(conn, &table.name))
            .map_err(|e| MigrationError::fetch(&table.name, e))
    }

    async fn get_rows(
        &mut self,
        table: &TableDescriptor,
        limit: u64,
        offset: u64,
    ) -> MigrationResult<Vec<RowRecord>> {
        self.conn()
            .and_then(|conn| {
                reader::read_table_page(conn, &table.name, &table.primary_key, limit, offset)
            })
            .map_err(|e| MigrationError::fetch(&table.name, e))
    }

    /// Copy the primary key into `id`. A rowid key is moved rather than
    /// copied, since it is not a real column.
    fn map_exported_row(
        &self,
        table: &TableDescriptor,
        mut row: RowRecord,
    ) -> MigrationResult<RowRecord> {
        if table.primary_key == ID_FIELD {
            return Ok(row);
        }

        let key = if table.primary_key == reader::ROWID {
            row.remove(reader::ROWID)
        } else {
            row.get(&table.primary_key).cloned()
        };

        let key = key.ok_or_else(|| {
            MigrationError::mapping(
                &table.name,
                anyhow::anyhow!("row has no '{}' column", table.primary_key),
            )
        })?;
        row.insert(ID_FIELD.to_string(), key);
        Ok(row)
    }

    async fn insert_rows(
        &mut self,
        table: &TableDescriptor,
        rows: Vec<RowRecord>,
    ) -> MigrationResult<()> {
        let conn = self
            .conn
            .as_mut()
            .context("SQLite connection is not open; call connect first")
            .map_err(|e| MigrationError::insert(&table.name, e))?;

        writer::upsert_rows(conn, &table.name, &rows)
            .map_err(|e| MigrationError::insert(&table.name, e))?;
        Ok(())
    }
}
