// Idempotency gate: suppress repeated triggers inside the cooldown window.
//
// State lives in one blob per subject, `{subjectId}/state.json`, holding a
// map of cooldown key → `{created}`. A check reads the whole map, and when
// the key is clear, upserts it and rewrites the whole map. Read-check-write
// is not atomic; concurrent invocations for the same subject can race.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use siteaudit_common::{GatePolicy, TriggerMessage};

use crate::serializer::pretty_json;
use crate::traits::BlobStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEntry {
    /// Epoch milliseconds of the last accepted trigger.
    pub created: i64,
}

pub type EventStates = BTreeMap<String, EventEntry>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStatus {
    /// Inside the cooldown window; `delta_secs` is the elapsed time, rounded.
    Active { delta_secs: i64 },
    Clear,
}

impl GateStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, GateStatus::Active { .. })
    }
}

/// Why no stored state could be read. Every variant means "start empty".
#[derive(Debug, Error, PartialEq)]
pub enum StateUnavailable {
    #[error("no state blob")]
    NotFound,

    #[error("state blob is not a valid state map: {0}")]
    Corrupt(String),

    #[error("state blob could not be read: {0}")]
    Transport(String),
}

pub struct IdempotencyGate {
    store: Arc<dyn BlobStore>,
    cooldown_ms: u64,
    policy: GatePolicy,
}

impl IdempotencyGate {
    pub fn new(store: Arc<dyn BlobStore>, cooldown_ms: u64, policy: GatePolicy) -> Self {
        Self {
            store,
            cooldown_ms,
            policy,
        }
    }

    pub fn state_path(subject_id: &str) -> String {
        format!("{subject_id}/state.json")
    }

    pub fn key_for(&self, message: &TriggerMessage) -> String {
        match self.policy {
            GatePolicy::PerMessage => message.raw().to_string(),
            GatePolicy::PerSubject => message.subject_id().to_string(),
        }
    }

    pub async fn load_states(&self, subject_id: &str) -> Result<EventStates, StateUnavailable> {
        let body = match self.store.get(&Self::state_path(subject_id)).await {
            Ok(Some(body)) => body,
            Ok(None) => return Err(StateUnavailable::NotFound),
            Err(e) => return Err(StateUnavailable::Transport(e.to_string())),
        };
        serde_json::from_slice(&body).map_err(|e| StateUnavailable::Corrupt(e.to_string()))
    }

    /// Check `key` in the subject's state blob at `now_ms`. An active key
    /// leaves the stored state untouched. A failed state write is an error.
    pub async fn check(&self, subject_id: &str, key: &str, now_ms: i64) -> Result<GateStatus> {
        let mut states = match self.load_states(subject_id).await {
            Ok(states) => states,
            Err(reason) => {
                debug!(subject = subject_id, %reason, "Starting from empty gate state");
                EventStates::new()
            }
        };

        if let Some(entry) = states.get(key) {
            let delta = now_ms - entry.created;
            if delta < i64::try_from(self.cooldown_ms).unwrap_or(i64::MAX) {
                let delta_secs = (delta as f64 / 1000.0).round() as i64;
                return Ok(GateStatus::Active { delta_secs });
            }
        }

        states.insert(key.to_string(), EventEntry { created: now_ms });
        let body = pretty_json(&states)?;
        let path = Self::state_path(subject_id);
        self.store
            .put(&path, Bytes::from(body), "application/json")
            .await
            .with_context(|| format!("Failed to write gate state {path}"))?;

        info!(subject = subject_id, key, path = path.as_str(), "Gate clear, state updated");
        Ok(GateStatus::Clear)
    }

    pub async fn check_event_state(&self, message: &TriggerMessage, now_ms: i64) -> Result<GateStatus> {
        let key = self.key_for(message);
        self.check(message.subject_id(), &key, now_ms).await
    }
}
