use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use gcp_client::TableFieldSchema;
use siteaudit_common::NormalizedRecord;

use crate::serializer::insert_row;
use crate::traits::Warehouse;

/// Column layout of the results table, one column per `NormalizedRecord` key.
pub const SCHEMA_JSON: &str = include_str!("../schema/bigquery-schema.json");

pub fn table_schema() -> Result<Vec<TableFieldSchema>> {
    serde_json::from_str(SCHEMA_JSON).context("Embedded table schema is invalid")
}

/// Per-row loader. Table creation is check-then-create and not atomic
/// against a concurrent creator.
pub struct WarehouseLoader {
    warehouse: Arc<dyn Warehouse>,
}

impl WarehouseLoader {
    pub fn new(warehouse: Arc<dyn Warehouse>) -> Self {
        Self { warehouse }
    }

    /// Returns whether the table had to be created.
    pub async fn ensure_table(&self) -> Result<bool> {
        if self.warehouse.table_exists().await? {
            return Ok(false);
        }
        let schema = table_schema()?;
        self.warehouse.create_table(&schema).await?;
        info!(columns = schema.len(), "Created results table");
        Ok(true)
    }

    /// Insert one record. Failures are logged and reported as `false`, never
    /// propagated.
    pub async fn insert_record(&self, record: &NormalizedRecord, job_id: &str) -> bool {
        match self.try_insert(record, job_id).await {
            Ok(()) => {
                info!(job_id, site = record.site_id.as_str(), "Inserted audit record");
                true
            }
            Err(e) => {
                error!(job_id, site = record.site_id.as_str(), error = %e, "Insert failed");
                false
            }
        }
    }

    async fn try_insert(&self, record: &NormalizedRecord, job_id: &str) -> Result<()> {
        let row = insert_row(record, job_id)?;
        self.warehouse.insert_row(row).await
    }
}
