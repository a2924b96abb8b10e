// Rendered reports and the raw audit log, written to blob storage under
// `{key}/report_{fetchTime}.{ext}` and `{key}/log_{fetchTime}.json`.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use futures::future::join_all;
use tracing::{info, warn};

use lighthouse_client::{AuditOutcome, OutputFormat};

use crate::serializer::pretty_json;
use crate::traits::BlobStore;

pub struct ArtifactWriter {
    store: Arc<dyn BlobStore>,
}

impl ArtifactWriter {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    pub fn report_path(key: &str, fetch_time: &str, format: OutputFormat) -> String {
        format!("{key}/report_{fetch_time}.{}", format.extension())
    }

    pub fn log_path(key: &str, fetch_time: &str) -> String {
        format!("{key}/log_{fetch_time}.json")
    }

    /// Write one artifact per requested format, concurrently, then the raw
    /// log. The log is written even if a format write failed; the first
    /// failure is returned afterwards. Returns the number of blobs written.
    pub async fn persist(&self, outcome: &AuditOutcome, key: &str, formats: &[OutputFormat]) -> Result<usize> {
        let fetch_time = outcome
            .lhr
            .get("fetchTime")
            .and_then(|v| v.as_str())
            .context("Audit result has no fetchTime")?;

        let writes = formats.iter().enumerate().map(|(i, format)| {
            let path = Self::report_path(key, fetch_time, *format);
            let body = outcome.report.get(i).cloned();
            async move {
                let body = body.ok_or_else(|| anyhow!("No rendered {} report for {path}", format.as_str()))?;
                self.store
                    .put(&path, Bytes::from(body), format.content_type())
                    .await
                    .with_context(|| format!("Failed to write {path}"))
            }
        });
        let results = join_all(writes).await;

        let log_path = Self::log_path(key, fetch_time);
        let log = self
            .store
            .put(&log_path, Bytes::from(pretty_json(&outcome.lhr)?), "application/json")
            .await
            .with_context(|| format!("Failed to write {log_path}"));

        let mut written = 0;
        let mut first_error = None;
        for result in results.into_iter().chain(std::iter::once(log)) {
            match result {
                Ok(()) => written += 1,
                Err(e) => {
                    warn!(key, error = %e, "Artifact write failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        info!(key, fetch_time, written, "Artifacts persisted");
        match first_error {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }
}
