// ABOUTME: DynamoDB target adapter writing rows with BatchWriteItem
// ABOUTME: Discovers prefixed tables and their HASH keys, encodes rows as tagged values

pub mod encoding;

use crate::adapter::{Adapter, Direction, StoreKind};
use crate::error::{MigrationError, Result as MigrationResult};
use crate::row::{RowRecord, TableDescriptor};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::types::{KeyType, PutRequest, WriteRequest};
use aws_sdk_dynamodb::Client;
use serde::{Deserialize, Serialize};

/// BatchWriteItem accepts at most this many requests per call.
pub const MAX_BATCH_WRITE: usize = 25;

fn default_region() -> String {
    "us-west-2".to_string()
}

/// `[dynamodb]` section of the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamoSettings {
    #[serde(default = "default_region")]
    pub region: String,
    /// Named profile from the shared AWS config files
    #[serde(default)]
    pub profile: Option<String>,
    /// Custom endpoint, e.g. DynamoDB Local at `http://localhost:8000`
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// Only tables starting with this prefix are visible; it is stripped
    /// from logical names and prepended on every request
    #[serde(default)]
    pub table_name_prefix: String,
}

impl Default for DynamoSettings {
    fn default() -> Self {
        Self {
            region: default_region(),
            profile: None,
            endpoint_url: None,
            table_name_prefix: String::new(),
        }
    }
}

impl DynamoSettings {
    /// Physical table name for a logical one.
    pub fn physical_name(&self, logical: &str) -> String {
        format!("{}{}", self.table_name_prefix, logical)
    }

    /// Logical name of a physical table, or `None` when it lacks the prefix.
    pub fn logical_name<'a>(&self, physical: &'a str) -> Option<&'a str> {
        physical.strip_prefix(self.table_name_prefix.as_str())
    }
}

/// Build a DynamoDB client from the settings and the default credential chain.
pub async fn build_client(settings: &DynamoSettings) -> Client {
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(aws_config::Region::new(settings.region.clone()));

    if let Some(ref profile) = settings.profile {
        loader = loader.profile_name(profile);
    }
    if let Some(ref endpoint) = settings.endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }

    let sdk_config = loader.load().await;

    tracing::info!(
        "DynamoDB client ready (region: {}, endpoint: {})",
        settings.region,
        settings.endpoint_url.as_deref().unwrap_or("default")
    );

    Client::new(&sdk_config)
}

/// DynamoDB target store.
pub struct DynamoAdapter {
    settings: DynamoSettings,
    client: Option<Client>,
}

impl DynamoAdapter {
    pub fn new(settings: &DynamoSettings) -> Self {
        Self {
            settings: settings.clone(),
            client: None,
        }
    }

    fn client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .context("DynamoDB client is not initialized; call connect first")
    }

    async fn list_physical_tables(&self) -> Result<Vec<String>> {
        let client = self.client()?;
        let mut names = Vec::new();
        let mut start: Option<String> = None;

        loop {
            let page = client
                .list_tables()
                .set_exclusive_start_table_name(start.take())
                .send()
                .await
                .context("Failed to list DynamoDB tables")?;

            names.extend(page.table_names().iter().cloned());

            match page.last_evaluated_table_name() {
                Some(last) => start = Some(last.to_string()),
                None => break,
            }
        }

        Ok(names)
    }

    async fn describe(&self, physical: &str) -> Result<(String, u64)> {
        let output = self
            .client()?
            .describe_table()
            .table_name(physical)
            .send()
            .await
            .with_context(|| format!("Failed to describe DynamoDB table '{}'", physical))?;

        let table = output
            .table()
            .with_context(|| format!("DynamoDB returned no description for '{}'", physical))?;

        let hash_key = table
            .key_schema()
            .iter()
            .find(|k| k.key_type() == &KeyType::Hash)
            .map(|k| k.attribute_name().to_string())
            .with_context(|| format!("Table '{}' has no HASH key", physical))?;

        let item_count = table.item_count().unwrap_or(0).max(0) as u64;

        Ok((hash_key, item_count))
    }

    async fn write_items(&self, table: &TableDescriptor, rows: &[RowRecord]) -> Result<()> {
        let physical = self.settings.physical_name(&table.name);
        let client = self.client()?;

        for (chunk_num, chunk) in rows.chunks(MAX_BATCH_WRITE).enumerate() {
            let requests = chunk
                .iter()
                .map(|row| {
                    let item = encoding::encode_item(&table.primary_key, row)?;
                    let put = PutRequest::builder()
                        .set_item(Some(item))
                        .build()
                        .context("Failed to build DynamoDB put request")?;
                    Ok(WriteRequest::builder().put_request(put).build())
                })
                .collect::<Result<Vec<_>>>()?;

            let output = client
                .batch_write_item()
                .request_items(physical.clone(), requests)
                .send()
                .await
                .with_context(|| {
                    format!(
                        "BatchWriteItem failed for chunk {} ({} items) of '{}'",
                        chunk_num,
                        chunk.len(),
                        physical
                    )
                })?;

            let unprocessed: usize = output
                .unprocessed_items()
                .map(|items| items.values().map(Vec::len).sum())
                .unwrap_or(0);
            if unprocessed > 0 {
                bail!(
                    "{} of {} items in chunk {} of '{}' were not processed",
                    unprocessed,
                    chunk.len(),
                    chunk_num,
                    physical
                );
            }
        }

        tracing::debug!("Wrote {} items to '{}'", rows.len(), physical);

        Ok(())
    }
}

#[async_trait]
impl Adapter for DynamoAdapter {
    fn kind(&self) -> StoreKind {
        StoreKind::Dynamodb
    }

    fn direction(&self) -> Direction {
        Direction::Target
    }

    /// The SDK is connectionless; this only resolves config and credentials.
    async fn connect(&mut self) -> MigrationResult<()> {
        if self.client.is_none() {
            self.client = Some(build_client(&self.settings).await);
        }
        Ok(())
    }

    async fn close_connection(&mut self) {
        self.client = None;
    }

    async fn get_tables(&mut self) -> MigrationResult<Vec<TableDescriptor>> {
        let discover = async {
            let mut tables = Vec::new();
            for physical in self.list_physical_tables().await? {
                let Some(logical) = self.settings.logical_name(&physical) else {
                    continue;
                };
                if logical.is_empty() {
                    continue;
                }
                tracing::debug!("Describing DynamoDB table '{}'", physical);
                let (hash_key, item_count) = self.describe(&physical).await?;
                let mut descriptor = TableDescriptor::new(logical, hash_key);
                descriptor.number_of_rows = Some(item_count);
                tables.push(descriptor);
            }
            Ok::<_, anyhow::Error>(tables)
        };
        discover
            .await
            .map_err(|e| MigrationError::discovery(StoreKind::Dynamodb, e))
    }

    /// `ItemCount` is refreshed by DynamoDB roughly every six hours.
    async fn get_number_of_rows(&mut self, table: &TableDescriptor) -> MigrationResult<u64> {
        let physical = self.settings.physical_name(&table.name);
        self.describe(&physical)
            .await
            .map(|(_, count)| count)
            .map_err(|e| MigrationError::fetch(&table.name, e))
    }

    /// Any item DynamoDB leaves unprocessed fails the batch; chunks written
    /// before it stay written.
    async fn insert_rows(
        &mut self,
        table: &TableDescriptor,
        rows: Vec<RowRecord>,
    ) -> MigrationResult<()> {
        self.write_items(table, &rows)
            .await
            .map_err(|e| MigrationError::insert(&table.name, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::FieldValue;

    #[test]
    fn test_settings_defaults() {
        let settings: DynamoSettings = toml::from_str("").unwrap();
        assert_eq!(settings.region, "us-west-2");
        assert_eq!(settings.table_name_prefix, "");
        assert!(settings.profile.is_none());
        assert!(settings.endpoint_url.is_none());
    }

    #[test]
    fn test_prefix_mapping() {
        let settings = DynamoSettings {
            table_name_prefix: "Staging_".to_string(),
            ..Default::default()
        };
        assert_eq!(settings.physical_name("users"), "Staging_users");
        assert_eq!(settings.logical_name("Staging_users"), Some("users"));
        assert_eq!(settings.logical_name("Prod_users"), None);

        let unprefixed = DynamoSettings::default();
        assert_eq!(unprefixed.logical_name("users"), Some("users"));
    }

    #[tokio::test]
    async fn test_source_operations_are_not_implemented() {
        let mut adapter = DynamoAdapter::new(&DynamoSettings::default());
        let table = TableDescriptor::new("users", "userId");

        let err = adapter.get_rows(&table, 10, 0).await.unwrap_err();
        assert!(matches!(
            err,
            MigrationError::NotImplemented {
                operation: "getRows",
                ..
            }
        ));
        assert!(adapter
            .map_exported_row(&table, RowRecord::new())
            .is_err());
    }

    #[test]
    fn test_imported_rows_pass_through() {
        let adapter = DynamoAdapter::new(&DynamoSettings::default());
        let table = TableDescriptor::new("users", "userId");
        let mut row = RowRecord::new();
        row.insert("id".to_string(), FieldValue::from("u1"));
        assert_eq!(adapter.map_imported_row(&table, row.clone()).unwrap(), row);
    }

    #[tokio::test]
    async fn test_insert_before_connect_fails() {
        let mut adapter = DynamoAdapter::new(&DynamoSettings::default());
        let table = TableDescriptor::new("users", "userId");
        let mut row = RowRecord::new();
        row.insert("id".to_string(), FieldValue::from("u1"));
        let err = adapter.insert_rows(&table, vec![row]).await.unwrap_err();
        assert!(matches!(err, MigrationError::Insert { .. }));
    }

    #[tokio::test]
    #[ignore]
    async fn test_live_write_against_dynamodb_local() {
        let endpoint = std::env::var("TEST_DYNAMODB_URL").expect("TEST_DYNAMODB_URL not set");
        let settings = DynamoSettings {
            endpoint_url: Some(endpoint),
            ..Default::default()
        };
        let mut adapter = DynamoAdapter::new(&settings);
        adapter.connect().await.unwrap();

        let tables = adapter.get_tables().await.unwrap();
        let Some(table) = tables.into_iter().next() else {
            return;
        };

        let mut row = RowRecord::new();
        row.insert("id".to_string(), FieldValue::from("datda-live-test"));
        row.insert("age".to_string(), FieldValue::from(30));
        adapter.insert_rows(&table, vec![row]).await.unwrap();
        adapter.close_connection().await;
    }
}
