// Pub/Sub push endpoint. Each push runs one invocation to completion and is
// acknowledged with 204 whatever the outcome; only a malformed envelope gets
// a 400.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use tracing::{info, warn};

use crate::orchestrator::{InvocationOutcome, Orchestrator};

#[derive(Debug, Deserialize)]
struct PushEnvelope {
    message: PushMessage,
    #[serde(default)]
    subscription: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushMessage {
    data: String,
    #[serde(default)]
    message_id: Option<String>,
}

pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/", post(push_handler))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(orchestrator)
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
}

async fn push_handler(State(orchestrator): State<Arc<Orchestrator>>, body: Bytes) -> StatusCode {
    let envelope: PushEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "Rejected malformed push envelope");
            return StatusCode::BAD_REQUEST;
        }
    };

    let outcome = orchestrator.handle(&envelope.message.data).await;
    log_outcome(
        envelope.message.message_id.as_deref(),
        envelope.subscription.as_deref(),
        &outcome,
    );
    StatusCode::NO_CONTENT
}

pub fn log_outcome(message_id: Option<&str>, subscription: Option<&str>, outcome: &InvocationOutcome) {
    let message_id = message_id.unwrap_or("-");
    let subscription = subscription.unwrap_or("-");
    info!(message_id, subscription, outcome = ?outcome, "Invocation finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::catalog::StaticSource;
    use crate::orchestrator::Dependencies;
    use crate::testing::{
        sample_config, MemoryBlobStore, MockAuditor, MockBrowserLauncher, MockWarehouse, RecordingPublisher,
    };
    use siteaudit_common::Environment;

    fn app() -> Router {
        let config = sample_config();
        let deps = Dependencies {
            blob_store: Arc::new(MemoryBlobStore::new()),
            warehouse: Arc::new(MockWarehouse::new()),
            publisher: Arc::new(RecordingPublisher::new()),
            launcher: Arc::new(MockBrowserLauncher::new(9222)),
            auditor: Arc::new(MockAuditor::new()),
            catalog: Arc::new(StaticSource::new(config.source.clone())),
        };
        router(Arc::new(Orchestrator::new(config, Environment::default(), deps)))
    }

    fn push(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let resp = app()
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_envelope_is_bad_request() {
        let resp = app().oneshot(push(r#"{"nope": true}"#)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_subject_is_still_acknowledged() {
        // "bm9wZQ==" is "nope"
        let resp = app()
            .oneshot(push(r#"{"message": {"data": "bm9wZQ==", "messageId": "1"}, "subscription": "s"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }
}
