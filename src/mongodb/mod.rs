// ABOUTME: MongoDB adapter serving as migration source or target
// ABOUTME: Maps _id to id on export and back on import, upserting by _id

pub mod converter;

use crate::adapter::{Adapter, Direction, StoreKind};
use crate::error::{MigrationError, Result as MigrationResult};
use crate::row::{RowRecord, TableDescriptor, ID_FIELD};
use crate::utils::{redact_url, validate_connection_url};
use ::mongodb::bson::{doc, Document};
use ::mongodb::options::{FindOptions, ReplaceOptions};
use ::mongodb::{Client, Database};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};

/// MongoDB's primary key field.
pub const MONGO_ID: &str = "_id";

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    27017
}

/// `[mongodb]` section of the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSettings {
    /// Full connection string; wins over `host`/`port`
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Falls back to the top-level `db` option
    #[serde(default)]
    pub database: Option<String>,
}

impl Default for MongoSettings {
    fn default() -> Self {
        Self {
            uri: None,
            host: default_host(),
            port: default_port(),
            database: None,
        }
    }
}

impl MongoSettings {
    pub fn connection_uri(&self) -> String {
        match self.uri {
            Some(ref uri) => uri.clone(),
            None => format!("mongodb://{}:{}", self.host, self.port),
        }
    }
}

/// Connect and verify the server answers a ping.
pub async fn connect_mongodb(uri: &str, database: &str) -> Result<Database> {
    validate_connection_url(uri, &["mongodb://", "mongodb+srv://"])?;

    tracing::info!("Connecting to MongoDB at {}", redact_url(uri));

    let client = Client::with_uri_str(uri)
        .await
        .context("Failed to create MongoDB client")?;
    let db = client.database(database);

    db.run_command(doc! { "ping": 1 }, None)
        .await
        .with_context(|| format!("Failed to reach MongoDB database '{}'", database))?;

    tracing::debug!("Successfully connected to MongoDB");

    Ok(db)
}

/// MongoDB store. Collections play the role of tables.
pub struct MongoAdapter {
    uri: String,
    database: String,
    direction: Direction,
    db: Option<Database>,
}

impl MongoAdapter {
    pub fn new(settings: &MongoSettings, direction: Direction) -> MigrationResult<Self> {
        let database = settings
            .database
            .clone()
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| {
                MigrationError::config("MongoDB database name missing: set `mongodb.database` or `db`")
            })?;

        let uri = settings.connection_uri();
        validate_connection_url(&uri, &["mongodb://", "mongodb+srv://"])
            .map_err(|e| MigrationError::config(format!("Invalid MongoDB uri: {:#}", e)))?;

        Ok(Self {
            uri,
            database,
            direction,
            db: None,
        })
    }

    fn db(&self) -> Result<&Database> {
        self.db
            .as_ref()
            .context("MongoDB connection is not open; call connect first")
    }

    async fn read_page(&self, collection: &str, limit: u64, offset: u64) -> Result<Vec<RowRecord>> {
        let options = FindOptions::builder()
            .sort(doc! { MONGO_ID: 1 })
            .skip(offset)
            .limit(limit as i64)
            .build();

        let cursor = self
            .db()?
            .collection::<Document>(collection)
            .find(None, options)
            .await
            .with_context(|| format!("Failed to query collection '{}'", collection))?;

        let docs: Vec<Document> = cursor
            .try_collect()
            .await
            .with_context(|| format!("Failed to read documents from '{}'", collection))?;

        Ok(docs.into_iter().map(converter::document_to_record).collect())
    }

    async fn upsert(&self, collection: &str, rows: &[RowRecord]) -> Result<()> {
        let coll = self.db()?.collection::<Document>(collection);

        for (idx, row) in rows.iter().enumerate() {
            let document = converter::record_to_document(row)
                .with_context(|| format!("Failed to convert row {} of batch", idx + 1))?;
            let id = document
                .get(MONGO_ID)
                .cloned()
                .with_context(|| format!("Row {} of batch has no _id", idx + 1))?;

            coll.replace_one(
                doc! { MONGO_ID: id },
                document,
                ReplaceOptions::builder().upsert(true).build(),
            )
            .await
            .with_context(|| format!("Failed to upsert row {} of batch", idx + 1))?;
        }

        Ok(())
    }
}

#[async_trait]
impl Adapter for MongoAdapter {
    fn kind(&self) -> StoreKind {
        StoreKind::Mongodb
    }

    fn direction(&self) -> Direction {
        self.direction
    }

    async fn connect(&mut self) -> MigrationResult<()> {
        if self.db.is_some() {
            return Ok(());
        }
        let db = connect_mongodb(&self.uri, &self.database)
            .await
            .map_err(|e| MigrationError::connection(StoreKind::Mongodb, e))?;
        self.db = Some(db);
        Ok(())
    }

    /// The driver's pool shuts down once the last handle is dropped.
    async fn close_connection(&mut self) {
        if self.db.take().is_some() {
            tracing::debug!("Closed MongoDB connection to '{}'", self.database);
        }
    }

    /// Collections sorted by name, skipping `system.*`.
    async fn get_tables(&mut self) -> MigrationResult<Vec<TableDescriptor>> {
        let discover = async {
            let mut names = self
                .db()?
                .list_collection_names(None)
                .await
                .context("Failed to list MongoDB collections")?;
            names.retain(|n| !n.starts_with("system."));
            names.sort();
            tracing::info!("Found {} collection(s) in '{}'", names.len(), self.database);
            Ok::<_, anyhow::Error>(
                names
                    .into_iter()
                    .map(|name| TableDescriptor::new(name, MONGO_ID))
                    .collect(),
            )
        };
        discover
            .await
            .map_err(|e| MigrationError::discovery(StoreKind::Mongodb, e))
    }

    async fn get_number_of_rows(&mut self, table: &TableDescriptor) -> MigrationResult<u64> {
        let count = async {
            self.db()?
                .collection::<Document>(&table.name)
                .count_documents(None, None)
                .await
                .with_context(|| format!("Failed to count documents in '{}'", table.name))
        };
        count
            .await
            .map_err(|e| MigrationError::fetch(&table.name, e))
    }

    async fn get_rows(
        &mut self,
        table: &TableDescriptor,
        limit: u64,
        offset: u64,
    ) -> MigrationResult<Vec<RowRecord>> {
        self.read_page(&table.name, limit, offset)
            .await
            .map_err(|e| MigrationError::fetch(&table.name, e))
    }

    /// `_id` → `id`. A document carrying its own different `id` fails
    /// instead of losing that field.
    fn map_exported_row(
        &self,
        table: &TableDescriptor,
        mut row: RowRecord,
    ) -> MigrationResult<RowRecord> {
        if let Some(id) = row.remove(MONGO_ID) {
            if let Some(existing) = row.get(ID_FIELD) {
                if *existing != id {
                    return Err(MigrationError::mapping(
                        &table.name,
                        anyhow::anyhow!(
                            "document {} already has an '{}' field ({}) that '{}' would overwrite",
                            id.to_key_string(),
                            ID_FIELD,
                            existing.to_key_string(),
                            MONGO_ID
                        ),
                    ));
                }
            }
            row.insert(ID_FIELD.to_string(), id);
        }
        Ok(row)
    }

    /// `id` → `_id`.
    fn map_imported_row(
        &self,
        table: &TableDescriptor,
        mut row: RowRecord,
    ) -> MigrationResult<RowRecord> {
        match row.remove(ID_FIELD) {
            Some(id) if !id.is_null() => {
                row.insert(MONGO_ID.to_string(), id);
                Ok(row)
            }
            _ => Err(MigrationError::mapping(
                &table.name,
                anyhow::anyhow!("documents need a non-null '{}' field", ID_FIELD),
            )),
        }
    }

    /// One `replace_one` upsert per document; a failure stops the batch
    /// with earlier documents already written.
    async fn insert_rows(
        &mut self,
        table: &TableDescriptor,
        rows: Vec<RowRecord>,
    ) -> MigrationResult<()> {
        self.upsert(&table.name, &rows)
            .await
            .map_err(|e| MigrationError::insert(&table.name, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::FieldValue;

    fn settings(database: Option<&str>) -> MongoSettings {
        MongoSettings {
            database: database.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_connection_uri_defaults() {
        assert_eq!(settings(None).connection_uri(), "mongodb://localhost:27017");

        let explicit = MongoSettings {
            uri: Some("mongodb+srv://cluster.example.net".to_string()),
            ..Default::default()
        };
        assert_eq!(explicit.connection_uri(), "mongodb+srv://cluster.example.net");
    }

    #[test]
    fn test_database_is_required() {
        let err = MongoAdapter::new(&settings(None), Direction::Source)
            .err()
            .unwrap();
        assert!(matches!(err, MigrationError::Configuration(_)));
        assert!(MongoAdapter::new(&settings(Some("app")), Direction::Source).is_ok());
    }

    #[test]
    fn test_id_mapping_both_ways() {
        let adapter = MongoAdapter::new(&settings(Some("app")), Direction::Source).unwrap();
        let table = TableDescriptor::new("users", MONGO_ID);

        let mut row = RowRecord::new();
        row.insert("_id".to_string(), FieldValue::from("507f1f77bcf86cd799439011"));
        row.insert("name".to_string(), FieldValue::from("Alice"));

        let exported = adapter.map_exported_row(&table, row).unwrap();
        assert_eq!(exported["id"], FieldValue::from("507f1f77bcf86cd799439011"));
        assert!(!exported.contains_key("_id"));

        let imported = adapter.map_imported_row(&table, exported).unwrap();
        assert_eq!(imported["_id"], FieldValue::from("507f1f77bcf86cd799439011"));
        assert!(!imported.contains_key("id"));
    }

    #[test]
    fn test_export_refuses_to_overwrite_own_id_field() {
        let adapter = MongoAdapter::new(&settings(Some("app")), Direction::Source).unwrap();
        let table = TableDescriptor::new("users", MONGO_ID);

        let mut row = RowRecord::new();
        row.insert("_id".to_string(), FieldValue::from("507f1f77bcf86cd799439011"));
        row.insert("id".to_string(), FieldValue::from(42));
        let err = adapter.map_exported_row(&table, row).unwrap_err();
        assert!(matches!(err, MigrationError::Mapping { .. }));

        // Matching values lose nothing
        let mut row = RowRecord::new();
        row.insert("_id".to_string(), FieldValue::from("u1"));
        row.insert("id".to_string(), FieldValue::from("u1"));
        let exported = adapter.map_exported_row(&table, row).unwrap();
        assert_eq!(exported["id"], FieldValue::from("u1"));
    }

    #[test]
    fn test_import_without_id_fails() {
        let adapter = MongoAdapter::new(&settings(Some("app")), Direction::Target).unwrap();
        let table = TableDescriptor::new("users", MONGO_ID);
        let err = adapter
            .map_imported_row(&table, RowRecord::new())
            .unwrap_err();
        assert!(matches!(err, MigrationError::Mapping { .. }));
    }

    #[tokio::test]
    #[ignore]
    async fn test_live_roundtrip() {
        let uri = std::env::var("TEST_MONGODB_URL").expect("TEST_MONGODB_URL not set");
        let cfg = MongoSettings {
            uri: Some(uri),
            database: Some("datda_live_test".to_string()),
            ..Default::default()
        };
        let mut adapter = MongoAdapter::new(&cfg, Direction::Target).unwrap();
        adapter.connect().await.unwrap();

        let table = TableDescriptor::new("users", MONGO_ID);
        let mut row = RowRecord::new();
        row.insert("id".to_string(), FieldValue::from("u1"));
        row.insert("age".to_string(), FieldValue::from(30));
        let row = adapter.map_imported_row(&table, row).unwrap();

        adapter.insert_rows(&table, vec![row.clone()]).await.unwrap();
        adapter.insert_rows(&table, vec![row]).await.unwrap();
        assert_eq!(adapter.get_number_of_rows(&table).await.unwrap(), 1);

        let rows = adapter.get_rows(&table, 10, 0).await.unwrap();
        assert_eq!(rows[0]["_id"], FieldValue::from("u1"));

        adapter.db().unwrap().drop(None).await.unwrap();
        adapter.close_connection().await;
    }
}
