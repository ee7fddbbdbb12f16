//! Pluggable delivery transports
//!
//! A transport accepts fully-built envelopes and owns its delivery policy:
//! queue-and-batch, detached fire-and-forget tasks, or local file append.
//! Acceptance is decoupled from delivery everywhere except the file
//! transport, whose append is the delivery.

mod batch;
mod detached;
mod file;

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::config::{ErrorHandler, Options, TransportKind};
use crate::envelope::Envelope;
use crate::error::{BeaconError, Result};
use crate::net::{default_endpoint, HttpSink};

pub(crate) use batch::QueuedBatchTransport;
pub(crate) use detached::DetachedTransport;
pub(crate) use file::AppendFileTransport;

/// Shared failure policy: error callback plus debug logging
///
/// Every transport-level failure funnels through [`Reporter::report`],
/// which invokes the configured handler exactly once and logs. The write
/// key only ever appears redacted in log output.
pub(crate) struct Reporter {
    debug: bool,
    handler: Option<ErrorHandler>,
    key_display: String,
}

impl Reporter {
    pub fn new(options: &Options, write_key: &str) -> Self {
        Self {
            debug: options.debug,
            handler: options.error_handler.clone(),
            key_display: redact(write_key),
        }
    }

    /// Report one transport-level failure
    pub fn report(&self, err: &BeaconError) {
        if let Some(handler) = &self.handler {
            handler(err.code(), &err.to_string());
        }

        if self.debug {
            error!(write_key = %self.key_display, code = err.code(), "transport failure: {err}");
        } else {
            debug!(code = err.code(), "transport failure: {err}");
        }
    }
}

/// Redact a write key for log output, keeping a short recognizable prefix
///
/// Keys too short for the prefix to stay a small fraction of the secret
/// are masked entirely.
fn redact(key: &str) -> String {
    if key.chars().count() < 8 {
        return "****".to_string();
    }
    let prefix: String = key.chars().take(4).collect();
    format!("{prefix}****")
}

/// A delivery transport, one of three structurally independent variants
pub(crate) enum Transport {
    QueuedBatch(QueuedBatchTransport),
    Detached(DetachedTransport),
    File(AppendFileTransport),
}

impl Transport {
    /// Build the transport selected by the options
    ///
    /// Network variants post to the explicit endpoint if one is set,
    /// otherwise to the default endpoint with the scheme picked by the
    /// ssl flag. Must be called within a tokio runtime: the queued-batch
    /// variant spawns its worker here.
    pub fn new(write_key: &str, options: &Options, reporter: Arc<Reporter>) -> Result<Self> {
        match options.transport {
            TransportKind::File => Ok(Transport::File(AppendFileTransport::new(
                &options.file_path,
                reporter,
            )?)),
            kind => {
                let url = options
                    .endpoint
                    .clone()
                    .unwrap_or_else(|| default_endpoint(options.ssl));
                if !options.ssl && options.endpoint.is_none() {
                    warn!(endpoint = %url, "TLS disabled; envelopes will travel in cleartext");
                }
                let sink = Arc::new(HttpSink::new(url, write_key.to_string()));

                match kind {
                    TransportKind::QueuedBatch => Ok(Transport::QueuedBatch(
                        QueuedBatchTransport::new(sink, options, reporter),
                    )),
                    TransportKind::Detached => Ok(Transport::Detached(DetachedTransport::new(
                        sink, options, reporter,
                    ))),
                    TransportKind::File => unreachable!("handled above"),
                }
            }
        }
    }

    /// Hand one envelope to the delivery pipeline
    ///
    /// Success means acceptance, not eventual delivery; post-acceptance
    /// failures reach only the error handler.
    pub fn accept(&self, envelope: Envelope) -> Result<()> {
        match self {
            Transport::QueuedBatch(t) => t.accept(envelope),
            Transport::Detached(t) => t.accept(envelope),
            Transport::File(t) => t.accept(&envelope),
        }
    }

    /// Best-effort drain of pending work within the configured wait bound
    pub async fn flush(&self) {
        match self {
            Transport::QueuedBatch(t) => t.flush().await,
            Transport::Detached(t) => t.flush().await,
            Transport::File(t) => t.flush(),
        }
    }

    /// Final flush, then release owned resources; bounded, idempotent
    pub async fn close(&self) {
        match self {
            Transport::QueuedBatch(t) => t.close().await,
            Transport::Detached(t) => t.close().await,
            Transport::File(t) => t.close(),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_keeps_prefix_only() {
        assert_eq!(redact("sk_live_abcdef"), "sk_l****");
    }

    #[test]
    fn test_redact_masks_short_keys_entirely() {
        assert_eq!(redact("ab"), "****");
        assert_eq!(redact("abcdefg"), "****");
        assert_eq!(redact(""), "****");
    }

    #[test]
    fn test_reporter_invokes_handler_once() {
        let probe = testutil::HandlerProbe::new();
        let mut options = Options::default();
        options.error_handler = Some(probe.handler());
        let reporter = Reporter::new(&options, "sk_live_abcdef");

        reporter.report(&BeaconError::Server(500));
        assert_eq!(probe.count(), 1);
        assert_eq!(probe.last_code().as_deref(), Some("server"));
    }
}
