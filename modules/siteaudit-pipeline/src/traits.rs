// Trait abstractions for every external capability the pipeline touches.
//
// - BlobStore: object put/get (Cloud Storage in production)
// - Warehouse: table existence/creation and row inserts (BigQuery)
// - TopicPublisher: trigger fan-out (Pub/Sub)
// - BrowserLauncher: headless browser lifecycle (Chromium)
// - Auditor: the page-quality engine (Lighthouse CLI)
//
// Components receive these as Arc<dyn Trait>, so tests substitute the
// in-memory fakes from `crate::testing` without touching the network.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

use gcp_client::{BigQueryClient, GcpError, InsertRow, PubSubClient, StorageClient, TableFieldSchema, TableRef};
use lighthouse_client::{AuditOutcome, ChromeInstance, ChromeLauncher, LighthouseCli, LighthouseFlags};

// ---------------------------------------------------------------------------
// BlobStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, path: &str, body: Bytes, content_type: &str) -> Result<()>;

    /// Read a whole object. A missing object is `Ok(None)`, not an error.
    async fn get(&self, path: &str) -> Result<Option<Bytes>>;
}

/// A single Cloud Storage bucket.
pub struct GcsBlobStore {
    client: StorageClient,
    bucket: String,
}

impl GcsBlobStore {
    pub fn new(client: StorageClient, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl BlobStore for GcsBlobStore {
    async fn put(&self, path: &str, body: Bytes, content_type: &str) -> Result<()> {
        Ok(self.client.upload(&self.bucket, path, body, content_type).await?)
    }

    async fn get(&self, path: &str) -> Result<Option<Bytes>> {
        match self.client.download(&self.bucket, path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(GcpError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Warehouse
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn table_exists(&self) -> Result<bool>;

    async fn create_table(&self, schema: &[TableFieldSchema]) -> Result<()>;

    async fn insert_row(&self, row: InsertRow) -> Result<()>;
}

/// The destination BigQuery table.
pub struct BigQueryWarehouse {
    client: BigQueryClient,
    table: TableRef,
}

impl BigQueryWarehouse {
    pub fn new(client: BigQueryClient, table: TableRef) -> Self {
        Self { client, table }
    }
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    async fn table_exists(&self) -> Result<bool> {
        Ok(self.client.table_exists(&self.table).await?)
    }

    async fn create_table(&self, schema: &[TableFieldSchema]) -> Result<()> {
        Ok(self.client.create_table(&self.table, schema).await?)
    }

    async fn insert_row(&self, row: InsertRow) -> Result<()> {
        Ok(self.client.insert_all(&self.table, vec![row]).await?)
    }
}

// ---------------------------------------------------------------------------
// TopicPublisher
// ---------------------------------------------------------------------------

#[async_trait]
pub trait TopicPublisher: Send + Sync {
    async fn publish(&self, data: Bytes) -> Result<()>;
}

/// The trigger topic on Pub/Sub.
pub struct PubSubTopic {
    client: PubSubClient,
    project_id: String,
    topic_id: String,
}

impl PubSubTopic {
    pub fn new(client: PubSubClient, project_id: impl Into<String>, topic_id: impl Into<String>) -> Self {
        Self {
            client,
            project_id: project_id.into(),
            topic_id: topic_id.into(),
        }
    }
}

#[async_trait]
impl TopicPublisher for PubSubTopic {
    async fn publish(&self, data: Bytes) -> Result<()> {
        let message_id = self
            .client
            .publish(&self.project_id, &self.topic_id, &data)
            .await?;
        tracing::debug!(message_id = message_id.as_str(), topic = self.topic_id.as_str(), "Published");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Browser and auditor
// ---------------------------------------------------------------------------

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>>;
}

/// A running browser instance. `close` must be called on every path; dropping
/// without closing is only a fallback.
#[async_trait]
pub trait BrowserSession: Send {
    fn debugging_port(&self) -> u16;

    async fn close(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait Auditor: Send + Sync {
    async fn audit(&self, url: &str, port: u16, flags: &LighthouseFlags) -> Result<AuditOutcome>;
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        let instance = ChromeLauncher::launch(self).await?;
        Ok(Box::new(instance))
    }
}

#[async_trait]
impl BrowserSession for ChromeInstance {
    fn debugging_port(&self) -> u16 {
        self.port()
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(ChromeInstance::close(*self).await?)
    }
}

#[async_trait]
impl Auditor for LighthouseCli {
    async fn audit(&self, url: &str, port: u16, flags: &LighthouseFlags) -> Result<AuditOutcome> {
        Ok(LighthouseCli::audit(self, url, port, flags).await?)
    }
}
