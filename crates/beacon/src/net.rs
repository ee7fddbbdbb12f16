//! Network primitive for reaching the ingestion endpoint
//!
//! The wire-level HTTP client is an external collaborator: transports only
//! see [`EndpointSink`], a send-batch-or-fail primitive. The production
//! implementation posts a JSON array over reqwest; tests substitute
//! recording or failing sinks.

use std::time::Duration;

use async_trait::async_trait;

use crate::envelope::Envelope;
use crate::error::BeaconError;

/// Default ingestion host
pub const DEFAULT_HOST: &str = "api.beacon.dev";

/// Default ingestion path
pub const DEFAULT_PATH: &str = "/v1/batch";

/// HTTP request timeout
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default endpoint URL for the given TLS setting
pub fn default_endpoint(ssl: bool) -> String {
    let scheme = if ssl { "https" } else { "http" };
    format!("{scheme}://{DEFAULT_HOST}{DEFAULT_PATH}")
}

/// One-shot delivery of a batch of envelopes
#[async_trait]
pub trait EndpointSink: Send + Sync {
    /// Deliver one batch; any error means the whole batch failed
    async fn deliver(&self, batch: &[Envelope]) -> Result<(), BeaconError>;
}

/// Reqwest-backed sink posting JSON arrays with basic-auth write key
pub struct HttpSink {
    client: reqwest::Client,
    url: String,
    write_key: String,
}

impl HttpSink {
    pub fn new(url: String, write_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            url,
            write_key,
        }
    }

    /// Endpoint URL this sink posts to
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl EndpointSink for HttpSink {
    async fn deliver(&self, batch: &[Envelope]) -> Result<(), BeaconError> {
        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.write_key, Some(""))
            .json(batch)
            .send()
            .await
            .map_err(|e| BeaconError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BeaconError::Server(status.as_u16()));
        }

        Ok(())
    }
}
