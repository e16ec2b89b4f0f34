//! HTTP remote client for the batch sync endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::sync::types::{BatchRequest, BatchResponse, RemoteTransport, TransportError};

/// Deadline for one batch upload. A timeout is a transport failure of the
/// whole batch; the server is expected to be idempotent on client id replay.
const BATCH_TIMEOUT: Duration = Duration::from_secs(30);
/// Deadline for the connectivity probe.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Stateless transporter over `POST /sync/batch` and `GET /sync/health`.
pub struct HttpRemoteClient {
    base_url: String,
    client: Client,
}

impl HttpRemoteClient {
    /// Create a client for the given API base URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportError> {
        let base_url = normalize_base_url(base_url.into())?;
        Ok(Self {
            base_url,
            client: Client::new(),
        })
    }

    /// Returns the base URL this client was configured with.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn normalize_base_url(raw: String) -> Result<String, TransportError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(TransportError::new("base URL must not be empty"));
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(TransportError::new(
            "base URL must include http:// or https://",
        ));
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

#[async_trait]
impl RemoteTransport for HttpRemoteClient {
    async fn post_batch(&self, batch: &BatchRequest) -> Result<BatchResponse, TransportError> {
        let url = format!("{}/sync/batch", self.base_url);
        let response = self
            .client
            .post(&url)
            .timeout(BATCH_TIMEOUT)
            .json(batch)
            .send()
            .await
            .map_err(|e| TransportError::new(format!("batch upload failed: {e}")))?;

        if !response.status().is_success() {
            return Err(TransportError::new(format!(
                "batch upload rejected: HTTP {}",
                response.status().as_u16()
            )));
        }

        response
            .json::<BatchResponse>()
            .await
            .map_err(|e| TransportError::new(format!("invalid batch response: {e}")))
    }

    async fn check_health(&self) -> Result<(), TransportError> {
        let url = format!("{}/sync/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(|e| TransportError::new(format!("health probe failed: {e}")))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(TransportError::new(format!(
                "health probe returned HTTP {}",
                response.status().as_u16()
            )))
        }
    }
}
