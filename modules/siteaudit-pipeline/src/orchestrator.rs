// One invocation per inbound trigger:
//
//   catalog → decode → (fan-out | unknown subject | flags → gate → audit
//   → artifacts ∥ normalize → job id → ensure table → insert)
//
// `handle` never fails. Every error ends up logged and reported as
// `InvocationOutcome::Failed`; the trigger transport has no retry contract.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use base64::Engine;
use tracing::{error, info, warn};
use uuid::Uuid;

use lighthouse_client::LighthouseFlags;
use siteaudit_common::{AuditConfig, Environment, ThirdParty, TriggerMessage};

use crate::artifacts::ArtifactWriter;
use crate::catalog::SubjectSource;
use crate::fanout::FanOutDispatcher;
use crate::gate::{GateStatus, IdempotencyGate};
use crate::normalizer::normalize;
use crate::runner::AuditRunner;
use crate::traits::{Auditor, BlobStore, BrowserLauncher, TopicPublisher, Warehouse};
use crate::warehouse::WarehouseLoader;

/// What one invocation did. Informational only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationOutcome {
    FannedOut { published: usize },
    UnknownSubject { subject: String },
    Debounced { key: String, delta_secs: i64 },
    Completed { job_id: String, inserted: bool },
    Failed { error: String },
}

/// Every external capability the orchestrator needs.
pub struct Dependencies {
    pub blob_store: Arc<dyn BlobStore>,
    pub warehouse: Arc<dyn Warehouse>,
    pub publisher: Arc<dyn TopicPublisher>,
    pub launcher: Arc<dyn BrowserLauncher>,
    pub auditor: Arc<dyn Auditor>,
    pub catalog: Arc<dyn SubjectSource>,
}

pub struct Orchestrator {
    config: AuditConfig,
    environment: Environment,
    catalog: Arc<dyn SubjectSource>,
    gate: IdempotencyGate,
    fanout: FanOutDispatcher,
    runner: AuditRunner,
    artifacts: ArtifactWriter,
    loader: WarehouseLoader,
}

impl Orchestrator {
    pub fn new(config: AuditConfig, environment: Environment, deps: Dependencies) -> Self {
        Self {
            gate: IdempotencyGate::new(
                deps.blob_store.clone(),
                config.min_time_between_triggers,
                config.gate_policy,
            ),
            fanout: FanOutDispatcher::new(deps.publisher, config.fan_out_policy),
            runner: AuditRunner::new(deps.launcher, deps.auditor),
            artifacts: ArtifactWriter::new(deps.blob_store),
            loader: WarehouseLoader::new(deps.warehouse),
            catalog: deps.catalog,
            config,
            environment,
        }
    }

    /// Handle a base64 transport payload.
    pub async fn handle(&self, payload_b64: &str) -> InvocationOutcome {
        match decode_payload(payload_b64) {
            Ok(raw) => self.handle_message(&raw).await,
            Err(e) => {
                error!(error = %e, "Undecodable trigger payload");
                InvocationOutcome::Failed {
                    error: format!("{e:#}"),
                }
            }
        }
    }

    /// Handle an already-decoded trigger message.
    pub async fn handle_message(&self, raw: &str) -> InvocationOutcome {
        match self.invoke(raw).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let error = format!("{e:#}");
                error!(message = raw.trim(), error = error.as_str(), "Invocation failed");
                InvocationOutcome::Failed { error }
            }
        }
    }

    async fn invoke(&self, raw: &str) -> Result<InvocationOutcome> {
        let subjects = self.catalog.subjects().await?;
        let message = TriggerMessage::parse(raw);

        if message.is_broadcast() {
            let ids: Vec<String> = subjects.into_iter().map(|s| s.id).collect();
            let report = self.fanout.dispatch_all(&ids).await?;
            return Ok(InvocationOutcome::FannedOut {
                published: report.published,
            });
        }

        let Some(subject) = subjects.into_iter().find(|s| s.id == message.subject_id()) else {
            error!(subject = message.subject_id(), "No valid message found!");
            return Ok(InvocationOutcome::UnknownSubject {
                subject: message.subject_id().to_string(),
            });
        };

        let flags = self.resolve_flags(&message)?;

        let now_ms = chrono::Utc::now().timestamp_millis();
        if let GateStatus::Active { delta_secs } = self.gate.check_event_state(&message, now_ms).await? {
            let key = self.gate.key_for(&message);
            warn!(
                key = key.as_str(),
                delta_secs,
                cooldown_secs = self.config.min_time_between_triggers / 1000,
                "Trigger inside cooldown window, skipping"
            );
            return Ok(InvocationOutcome::Debounced { key, delta_secs });
        }

        let outcome = self.runner.run(&subject.id, &subject.url, &flags).await?;

        let formats = flags.output_formats();
        let (persisted, normalized) = tokio::join!(
            self.artifacts.persist(&outcome, &subject.id, &formats),
            async { normalize(&outcome.lhr, &subject.id) },
        );
        persisted?;
        let mut record = normalized.with_context(|| format!("Failed to normalize report for {}", subject.id))?;

        let job_id = Uuid::new_v4().to_string();
        record.job_id = Some(job_id.clone());

        self.loader.ensure_table().await?;
        let inserted = self.loader.insert_record(&record, &job_id).await;

        info!(subject = subject.id.as_str(), job_id = job_id.as_str(), inserted, "Audit complete");
        Ok(InvocationOutcome::Completed { job_id, inserted })
    }

    /// Configured flags, with the blocked-request list and form factor
    /// overridden by the message.
    pub fn resolve_flags(&self, message: &TriggerMessage) -> Result<LighthouseFlags> {
        let mut flags = self.config.lighthouse_flags.clone();

        if message.third_party() == ThirdParty::Blocked {
            let patterns = self
                .environment
                .third_party_to_block
                .clone()
                .ok_or_else(|| anyhow!("{} requested but THIRDPARTY_TO_BLOCK is not set", ThirdParty::Blocked))?;
            flags.blocked_url_patterns = Some(patterns);
        }

        if let Some(device) = message.device_mode() {
            flags.emulated_form_factor = Some(device.to_string());
        }

        Ok(flags)
    }
}

fn decode_payload(payload_b64: &str) -> Result<String> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload_b64.trim())
        .context("Trigger payload is not base64")?;
    String::from_utf8(bytes).context("Trigger payload is not UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticSource;
    use crate::testing::{
        sample_config, MemoryBlobStore, MockAuditor, MockBrowserLauncher, MockWarehouse, RecordingPublisher,
    };

    fn orchestrator(environment: Environment) -> Orchestrator {
        let config = sample_config();
        let deps = Dependencies {
            blob_store: Arc::new(MemoryBlobStore::new()),
            warehouse: Arc::new(MockWarehouse::new()),
            publisher: Arc::new(RecordingPublisher::new()),
            launcher: Arc::new(MockBrowserLauncher::new(9222)),
            auditor: Arc::new(MockAuditor::new()),
            catalog: Arc::new(StaticSource::new(config.source.clone())),
        };
        Orchestrator::new(config, environment, deps)
    }

    #[test]
    fn device_mode_overrides_form_factor() {
        let orch = orchestrator(Environment::default());
        let flags = orch
            .resolve_flags(&TriggerMessage::parse("ebay_thirdPartyIncluded_desktop"))
            .unwrap();
        assert_eq!(flags.emulated_form_factor.as_deref(), Some("desktop"));
        assert_eq!(flags.blocked_url_patterns, None);
        assert_eq!(flags.output, vec!["html", "csv"]);
    }

    #[test]
    fn bare_message_keeps_configured_flags() {
        let orch = orchestrator(Environment::default());
        let flags = orch.resolve_flags(&TriggerMessage::parse("ebay")).unwrap();
        assert_eq!(flags, sample_config().lighthouse_flags);
    }

    #[test]
    fn blocked_variant_uses_environment_patterns() {
        let orch = orchestrator(Environment {
            third_party_to_block: Some(vec!["*.doubleclick.net".to_string()]),
            ..Default::default()
        });
        let flags = orch
            .resolve_flags(&TriggerMessage::parse("ebay_thirdPartyBlocked"))
            .unwrap();
        assert_eq!(flags.blocked_url_patterns, Some(vec!["*.doubleclick.net".to_string()]));
        assert_eq!(flags.emulated_form_factor.as_deref(), Some("mobile"));
    }

    #[test]
    fn blocked_variant_without_patterns_is_an_error() {
        let orch = orchestrator(Environment::default());
        let err = orch
            .resolve_flags(&TriggerMessage::parse("ebay_thirdPartyBlocked_mobile"))
            .unwrap_err();
        assert!(err.to_string().contains("THIRDPARTY_TO_BLOCK"));
    }

    #[test]
    fn payload_decoding() {
        assert_eq!(decode_payload("ZWJheQ==\n").unwrap(), "ebay");
        assert!(decode_payload("%%%").is_err());
        assert!(decode_payload("/w==").is_err());
    }
}
