use std::sync::Arc;
use std::time::Duration;

use gcp_auth::TokenProvider;

use crate::error::{GcpError, Result};

const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Shared HTTP client and credentials for all GCP REST clients.
#[derive(Clone)]
pub struct GcpSession {
    http: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
}

impl std::fmt::Debug for GcpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpSession")
            .field("http", &self.http)
            .field("tokens", &"<TokenProvider>")
            .finish()
    }
}

impl GcpSession {
    /// Discover credentials from the environment (service account file,
    /// gcloud config or the metadata server).
    pub async fn discover() -> Result<Self> {
        let tokens = gcp_auth::provider()
            .await
            .map_err(|e| GcpError::Auth(format!("Failed to initialize GCP auth: {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| GcpError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { http, tokens })
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) async fn bearer(&self) -> Result<String> {
        let token = self
            .tokens
            .token(&[CLOUD_PLATFORM_SCOPE])
            .await
            .map_err(|e| GcpError::Auth(format!("Failed to get GCP access token: {e}")))?;
        Ok(token.as_str().to_string())
    }
}

/// Map non-success responses to errors. 404 becomes `NotFound(what)`.
pub(crate) async fn check_status(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(GcpError::NotFound(what.to_string()));
    }
    let message = resp.text().await.unwrap_or_default();
    Err(GcpError::Api {
        status: status.as_u16(),
        message,
    })
}
