// Broadcast expansion: one `all` trigger becomes four per-subject triggers
// (third parties included/blocked × mobile/desktop).

use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use futures::future::join_all;
use tracing::{error, info, warn};

use siteaudit_common::{FanOutPolicy, ThirdParty, TriggerMessage, DEVICE_MODES};

use crate::traits::TopicPublisher;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub subjects: usize,
    pub published: usize,
    pub failed: usize,
}

pub struct FanOutDispatcher {
    publisher: Arc<dyn TopicPublisher>,
    policy: FanOutPolicy,
}

impl FanOutDispatcher {
    pub fn new(publisher: Arc<dyn TopicPublisher>, policy: FanOutPolicy) -> Self {
        Self { publisher, policy }
    }

    /// Publish every subject's four triggers. Subjects run concurrently, each
    /// subject's own messages in order; one subject's failure never stops the
    /// others. Under `AllOrNothing` the first failure is returned afterwards.
    pub async fn dispatch_all(&self, subject_ids: &[String]) -> Result<FanOutReport> {
        let results = join_all(subject_ids.iter().map(|id| self.dispatch_subject(id))).await;

        let mut report = FanOutReport {
            subjects: subject_ids.len(),
            ..Default::default()
        };
        let mut first_error = None;

        for (id, (published, result)) in subject_ids.iter().zip(results) {
            report.published += published;
            if let Err(e) = result {
                report.failed += 1;
                warn!(subject = id.as_str(), error = %e, "Fan-out publish failed");
                first_error.get_or_insert(e);
            }
        }

        info!(
            subjects = report.subjects,
            published = report.published,
            failed = report.failed,
            "Fan-out finished"
        );

        match (self.policy, first_error) {
            (FanOutPolicy::AllOrNothing, Some(e)) => {
                error!(failed = report.failed, "Fan-out incomplete");
                Err(e)
            }
            _ => Ok(report),
        }
    }

    /// Returns how many messages went out before any failure.
    async fn dispatch_subject(&self, subject_id: &str) -> (usize, Result<()>) {
        let mut published = 0;
        for message in trigger_messages(subject_id) {
            if let Err(e) = self.publisher.publish(Bytes::from(message.clone())).await {
                return (published, Err(e.context(format!("publishing {message}"))));
            }
            published += 1;
        }
        (published, Ok(()))
    }
}

/// The per-subject triggers, blocked variants last.
pub fn trigger_messages(subject_id: &str) -> Vec<String> {
    ThirdParty::ALL
        .iter()
        .flat_map(|tp| {
            DEVICE_MODES
                .iter()
                .map(move |device| TriggerMessage::encode(subject_id, *tp, device))
        })
        .collect()
}
