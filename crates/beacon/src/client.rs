//! Main SDK client
//!
//! The client stamps raw call fields into envelopes and hands them to the
//! configured transport. All six call methods return as soon as the
//! envelope is accepted into the delivery pipeline; delivery itself is
//! asynchronous and best-effort per transport.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::config::Options;
use crate::envelope::{EnvelopeBuilder, EventKind};
use crate::error::Result;
use crate::transport::{Reporter, Transport};

/// Analytics client with a pluggable delivery transport
///
/// Create one client per write key and share it across threads; all call
/// methods take `&self`. Must be constructed inside a tokio runtime (the
/// network transports spawn background tasks). Shut it down with an
/// explicit [`Client::close`] on every exit path; there is no flush on
/// drop.
pub struct Client {
    builder: EnvelopeBuilder,
    transport: Transport,
}

impl Client {
    /// Create a client for the given write key
    pub fn new(write_key: impl Into<String>, options: Options) -> Result<Self> {
        let write_key = write_key.into();
        let reporter = Arc::new(Reporter::new(&options, &write_key));
        let transport = Transport::new(&write_key, &options, reporter)?;

        Ok(Self {
            builder: EnvelopeBuilder::new(),
            transport,
        })
    }

    /// Track a user action
    pub fn track(&self, message: Map<String, Value>) -> Result<()> {
        self.submit(EventKind::Track, message)
    }

    /// Associate traits with a user
    pub fn identify(&self, message: Map<String, Value>) -> Result<()> {
        self.submit(EventKind::Identify, message)
    }

    /// Associate traits with a group
    pub fn group(&self, message: Map<String, Value>) -> Result<()> {
        self.submit(EventKind::Group, message)
    }

    /// Record a page view
    pub fn page(&self, message: Map<String, Value>) -> Result<()> {
        self.submit(EventKind::Page, message)
    }

    /// Record a screen view
    pub fn screen(&self, message: Map<String, Value>) -> Result<()> {
        self.submit(EventKind::Screen, message)
    }

    /// Alias one user id to another
    pub fn alias(&self, message: Map<String, Value>) -> Result<()> {
        self.submit(EventKind::Alias, message)
    }

    /// Best-effort drain of pending deliveries, bounded by `wait_timeout`
    pub async fn flush(&self) {
        self.transport.flush().await;
    }

    /// Final flush, then release transport resources
    ///
    /// Bounded and idempotent; accepts after close fail cleanly.
    pub async fn close(&self) {
        self.transport.close().await;
    }

    fn submit(&self, kind: EventKind, message: Map<String, Value>) -> Result<()> {
        let envelope = self.builder.build(message, kind);
        self.transport.accept(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportKind;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("test input must be an object"),
        }
    }

    fn file_client(path: &std::path::Path) -> Client {
        let options = Options::default()
            .with_transport(TransportKind::File)
            .with_file_path(path);
        Client::new("test_write_key", options).unwrap()
    }

    #[tokio::test]
    async fn test_all_six_calls_stamp_their_kind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");
        let client = file_client(&path);

        client
            .track(fields(json!({"userId": "u1", "event": "Signed Up"})))
            .unwrap();
        client
            .identify(fields(json!({"userId": "u1", "traits": {"plan": "pro"}})))
            .unwrap();
        client
            .group(fields(json!({"userId": "u1", "groupId": "g1"})))
            .unwrap();
        client
            .page(fields(json!({"userId": "u1", "name": "Home"})))
            .unwrap();
        client
            .screen(fields(json!({"userId": "u1", "name": "Login"})))
            .unwrap();
        client
            .alias(fields(json!({"userId": "u1", "previousId": "anon-1"})))
            .unwrap();
        client.close().await;

        let content = std::fs::read_to_string(&path).unwrap();
        let kinds: Vec<String> = content
            .lines()
            .map(|line| {
                let parsed: Value = serde_json::from_str(line).unwrap();
                parsed["type"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(
            kinds,
            ["track", "identify", "group", "page", "screen", "alias"]
        );
    }

    #[tokio::test]
    async fn test_envelopes_on_disk_are_fully_stamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");
        let client = file_client(&path);

        client
            .track(fields(json!({"anonymousId": "a1", "event": "Viewed"})))
            .unwrap();
        client.close().await;

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: Value = serde_json::from_str(content.lines().next().unwrap()).unwrap();

        assert_eq!(parsed["properties"], json!({}));
        assert_eq!(parsed["context"]["library"]["name"], json!("beacon"));
        assert!(uuid::Uuid::parse_str(parsed["messageId"].as_str().unwrap()).is_ok());
        assert!(chrono::DateTime::parse_from_rfc3339(parsed["timestamp"].as_str().unwrap())
            .is_ok());
    }

    #[tokio::test]
    async fn test_client_remains_usable_after_acceptance_failure() {
        let mut options = Options::default()
            .with_transport(TransportKind::QueuedBatch)
            .with_flush_interval(std::time::Duration::from_secs(3600))
            .with_endpoint("http://127.0.0.1:9/v1/batch");
        options.max_queue_size = 1;
        options.max_retries = 0;
        options.retry_backoff = std::time::Duration::from_millis(1);
        let client = Client::new("test_write_key", options).unwrap();

        client
            .track(fields(json!({"userId": "u1", "event": "one"})))
            .unwrap();
        // Queue of one is now full; acceptance fails but the client lives.
        assert!(client
            .track(fields(json!({"userId": "u1", "event": "two"})))
            .is_err());
        client.close().await;
    }
}
