//! Client configuration

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Callback invoked once per transport-level failure with `(code, message)`
pub type ErrorHandler = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Which delivery transport the client uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// In-memory queue drained as batches by a background worker
    #[default]
    QueuedBatch,
    /// One detached delivery task per envelope, fire-and-forget
    Detached,
    /// Newline-delimited JSON appended to a local file
    File,
}

/// Client options
///
/// `Default` gives the queued-batch transport with TLS enabled. Builder
/// methods cover the common overrides.
#[derive(Clone)]
pub struct Options {
    /// Delivery transport variant
    pub transport: TransportKind,

    /// Verbose failure logging in addition to the error handler
    pub debug: bool,

    /// Reach the endpoint over TLS (default: true)
    ///
    /// Disabling this trades confidentiality for round-trip latency and is
    /// logged loudly at client construction; it is never a silent default.
    pub ssl: bool,

    /// Invoked once per transport-level failure
    pub error_handler: Option<ErrorHandler>,

    /// Envelopes per batch; reaching this count triggers a flush
    pub batch_size: usize,

    /// Maximum age of the oldest queued envelope before a flush
    pub flush_interval: Duration,

    /// Queue capacity; a full queue fails `accept` synchronously
    pub max_queue_size: usize,

    /// Delivery retries after the first failed attempt
    pub max_retries: u32,

    /// Base backoff between retries, doubled per attempt
    pub retry_backoff: Duration,

    /// Concurrent delivery workers for the detached transport
    pub max_in_flight: usize,

    /// Explicit ingestion URL; overrides the ssl-derived default
    pub endpoint: Option<String>,

    /// Output path for the file transport
    pub file_path: PathBuf,

    /// Bound on every flush/close wait
    pub wait_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            transport: TransportKind::QueuedBatch,
            debug: false,
            ssl: true,
            error_handler: None,
            batch_size: 100,
            flush_interval: Duration::from_secs(10),
            max_queue_size: 10_000,
            max_retries: 3,
            retry_backoff: Duration::from_millis(250),
            max_in_flight: 64,
            endpoint: None,
            file_path: std::env::temp_dir().join("beacon.log"),
            wait_timeout: Duration::from_secs(5),
        }
    }
}

impl Options {
    /// Select the delivery transport
    #[must_use]
    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    /// Enable verbose failure logging
    #[must_use]
    pub fn with_debug(mut self) -> Self {
        self.debug = true;
        self
    }

    /// Disable TLS towards the endpoint
    #[must_use]
    pub fn without_ssl(mut self) -> Self {
        self.ssl = false;
        self
    }

    /// Install an error handler
    #[must_use]
    pub fn with_error_handler(
        mut self,
        handler: impl Fn(&str, &str) + Send + Sync + 'static,
    ) -> Self {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Set the batch size
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the maximum queued-envelope age before a flush
    #[must_use]
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Override the ingestion endpoint URL
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the file transport output path
    #[must_use]
    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = path.into();
        self
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("transport", &self.transport)
            .field("debug", &self.debug)
            .field("ssl", &self.ssl)
            .field("error_handler", &self.error_handler.is_some())
            .field("batch_size", &self.batch_size)
            .field("flush_interval", &self.flush_interval)
            .field("max_queue_size", &self.max_queue_size)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff", &self.retry_backoff)
            .field("max_in_flight", &self.max_in_flight)
            .field("endpoint", &self.endpoint)
            .field("file_path", &self.file_path)
            .field("wait_timeout", &self.wait_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = Options::default();
        assert_eq!(options.transport, TransportKind::QueuedBatch);
        assert!(options.ssl);
        assert!(!options.debug);
        assert_eq!(options.batch_size, 100);
        assert_eq!(options.max_queue_size, 10_000);
        assert!(options.error_handler.is_none());
    }

    #[test]
    fn test_builder_overrides() {
        let options = Options::default()
            .with_transport(TransportKind::File)
            .with_debug()
            .without_ssl()
            .with_batch_size(25)
            .with_endpoint("http://localhost:8080/v1/batch");

        assert_eq!(options.transport, TransportKind::File);
        assert!(options.debug);
        assert!(!options.ssl);
        assert_eq!(options.batch_size, 25);
        assert_eq!(
            options.endpoint.as_deref(),
            Some("http://localhost:8080/v1/batch")
        );
    }

    #[test]
    fn test_batch_size_floor_is_one() {
        let options = Options::default().with_batch_size(0);
        assert_eq!(options.batch_size, 1);
    }
}
