// Test doubles for the pipeline.
//
// One fake per trait boundary:
// - MemoryBlobStore (BlobStore): in-memory objects with content types
// - MockWarehouse (Warehouse): records created tables and inserted rows
// - RecordingPublisher (TopicPublisher): records published messages
// - MockBrowserLauncher (BrowserLauncher): counts launches and closes
// - MockAuditor (Auditor): returns the fixture report, records calls
//
// LogCapture collects the pipeline's tracing events for the current thread.
//
// Plus fixtures: `sample_lhr()` and `sample_config()`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

use gcp_client::{InsertRow, TableFieldSchema};
use lighthouse_client::{AuditOutcome, LighthouseFlags};
use siteaudit_common::{AuditConfig, Environment};

use crate::traits::{Auditor, BlobStore, BrowserLauncher, BrowserSession, TopicPublisher, Warehouse};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const MOCK_LHR: &str = include_str!("../tests/fixtures/mock_lhr.json");

/// A complete Lighthouse result for https://www.google.com/, mobile.
pub fn sample_lhr() -> serde_json::Value {
    serde_json::from_str(MOCK_LHR).expect("mock_lhr.json is valid JSON")
}

/// Two static subjects (`googlesearch`, `ebay`), html+csv output, 5 minute cooldown.
pub fn sample_config() -> AuditConfig {
    AuditConfig::from_json(
        r#"{
            "projectId": "lighthouse-monitor",
            "source": [
                {"id": "googlesearch", "url": "https://www.google.com/"},
                {"id": "ebay", "url": "https://www.ebay.com/"}
            ],
            "lighthouseFlags": {"output": ["html", "csv"], "emulatedFormFactor": "mobile"},
            "minTimeBetweenTriggers": 300000,
            "datasetId": "lighthouse",
            "pubsubTopicId": "launch-lighthouse",
            "gcs": {"bucketName": "lighthouse-reports"}
        }"#,
        &Environment::default(),
    )
    .expect("sample config is valid")
}

// ---------------------------------------------------------------------------
// MemoryBlobStore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<BTreeMap<String, (Bytes, String)>>,
    puts: AtomicUsize,
    gets: AtomicUsize,
    fail_reads: bool,
    fail_writes: bool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `get` returns a transport error.
    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    /// Every `put` returns an error and stores nothing.
    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// Seed an object without counting it as a put.
    pub fn insert(&self, path: &str, body: impl Into<Bytes>) {
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), (body.into(), "application/octet-stream".to_string()));
    }

    pub fn object(&self, path: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(path).map(|(b, _)| b.clone())
    }

    pub fn content_type(&self, path: &str) -> Option<String> {
        self.objects.lock().unwrap().get(path).map(|(_, ct)| ct.clone())
    }

    /// Stored paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, path: &str, body: Bytes, content_type: &str) -> Result<()> {
        if self.fail_writes {
            bail!("blob store unavailable: put {path}");
        }
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), (body, content_type.to_string()));
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Bytes>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads {
            bail!("blob store unavailable: get {path}");
        }
        Ok(self.object(path))
    }
}

// ---------------------------------------------------------------------------
// MockWarehouse
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockWarehouse {
    exists: Mutex<bool>,
    creates: AtomicUsize,
    schema: Mutex<Vec<TableFieldSchema>>,
    rows: Mutex<Vec<InsertRow>>,
    fail_inserts: bool,
}

impl MockWarehouse {
    /// Starts without a table.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self) -> Self {
        *self.exists.lock().unwrap() = true;
        self
    }

    pub fn failing_inserts(mut self) -> Self {
        self.fail_inserts = true;
        self
    }

    pub fn create_calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn schema(&self) -> Vec<TableFieldSchema> {
        self.schema.lock().unwrap().clone()
    }

    pub fn rows(&self) -> Vec<InsertRow> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl Warehouse for MockWarehouse {
    async fn table_exists(&self) -> Result<bool> {
        Ok(*self.exists.lock().unwrap())
    }

    async fn create_table(&self, schema: &[TableFieldSchema]) -> Result<()> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        *self.schema.lock().unwrap() = schema.to_vec();
        *self.exists.lock().unwrap() = true;
        Ok(())
    }

    async fn insert_row(&self, row: InsertRow) -> Result<()> {
        if self.fail_inserts {
            bail!("insertErrors: row {} rejected", row.insert_id);
        }
        self.rows.lock().unwrap().push(row);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingPublisher
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<String>>,
    fail_prefix: Option<String>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject (and don't record) messages starting with `prefix`.
    pub fn failing_for(mut self, prefix: &str) -> Self {
        self.fail_prefix = Some(prefix.to_string());
        self
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl TopicPublisher for RecordingPublisher {
    async fn publish(&self, data: Bytes) -> Result<()> {
        let message = String::from_utf8(data.to_vec())?;
        if let Some(ref prefix) = self.fail_prefix {
            if message.starts_with(prefix.as_str()) {
                bail!("topic rejected {message}");
            }
        }
        self.messages.lock().unwrap().push(message);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockBrowserLauncher
// ---------------------------------------------------------------------------

pub struct MockBrowserLauncher {
    port: u16,
    launched: AtomicUsize,
    closed: Arc<AtomicUsize>,
    fail: bool,
}

impl MockBrowserLauncher {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            launched: AtomicUsize::new(0),
            closed: Arc::new(AtomicUsize::new(0)),
            fail: false,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn launched(&self) -> usize {
        self.launched.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for MockBrowserLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        if self.fail {
            bail!("browser failed to start");
        }
        self.launched.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockBrowser {
            port: self.port,
            closed: self.closed.clone(),
        }))
    }
}

struct MockBrowser {
    port: u16,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl BrowserSession for MockBrowser {
    fn debugging_port(&self) -> u16 {
        self.port
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockAuditor
// ---------------------------------------------------------------------------

/// Returns `sample_lhr()` plus one `<format report>` string per requested
/// output format.
pub struct MockAuditor {
    lhr: serde_json::Value,
    calls: Mutex<Vec<(String, u16)>>,
    flags: Mutex<Vec<LighthouseFlags>>,
    fail: bool,
}

impl MockAuditor {
    pub fn new() -> Self {
        Self {
            lhr: sample_lhr(),
            calls: Mutex::new(Vec::new()),
            flags: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn with_lhr(mut self, lhr: serde_json::Value) -> Self {
        self.lhr = lhr;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// `(url, port)` per audit.
    pub fn calls(&self) -> Vec<(String, u16)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn flags_seen(&self) -> Vec<LighthouseFlags> {
        self.flags.lock().unwrap().clone()
    }
}

impl Default for MockAuditor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Auditor for MockAuditor {
    async fn audit(&self, url: &str, port: u16, flags: &LighthouseFlags) -> Result<AuditOutcome> {
        self.calls.lock().unwrap().push((url.to_string(), port));
        self.flags.lock().unwrap().push(flags.clone());
        if self.fail {
            bail!("audit failed: {url}");
        }
        Ok(AuditOutcome {
            lhr: self.lhr.clone(),
            report: flags
                .output_formats()
                .iter()
                .map(|f| format!("<{} report>", f.as_str()))
                .collect(),
        })
    }
}

// ---------------------------------------------------------------------------
// LogCapture
// ---------------------------------------------------------------------------

/// Records `(level, message)` for every event emitted by a `siteaudit_*` target.
#[derive(Clone, Default)]
pub struct LogCapture {
    events: Arc<Mutex<Vec<(Level, String)>>>,
}

impl LogCapture {
    /// Capture on this thread until the guard drops. Use with a
    /// current-thread runtime so spawned work stays on the same thread.
    pub fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        let capture = Self::default();
        let subscriber = tracing_subscriber::registry().with(capture.clone());
        (capture, tracing::subscriber::set_default(subscriber))
    }

    pub fn events(&self) -> Vec<(Level, String)> {
        self.events.lock().unwrap().clone()
    }
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

impl<S: Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if !metadata.target().starts_with("siteaudit") {
            return;
        }
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        self.events.lock().unwrap().push((*metadata.level(), visitor.0));
    }
}
