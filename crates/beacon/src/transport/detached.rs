//! Detached-task transport
//!
//! Fire-and-forget: every accepted envelope is handed to its own spawned
//! delivery task and the caller returns as soon as the spawn succeeds. The
//! task's eventual outcome is unobservable to the caller; failures reach
//! only the error handler. This is an accepted data-loss mode. A semaphore
//! caps the number of outstanding deliveries, and hitting the cap fails
//! `accept` synchronously until a worker finishes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, Semaphore, TryAcquireError};
use tokio::time::timeout;
use tracing::{debug, warn};

use super::Reporter;
use crate::config::Options;
use crate::envelope::Envelope;
use crate::error::{BeaconError, Result};
use crate::net::EndpointSink;

pub(crate) struct DetachedTransport {
    sink: Arc<dyn EndpointSink>,
    permits: Arc<Semaphore>,
    limit: usize,
    reporter: Arc<Reporter>,
    // Flush waits on this pair instead of the semaphore's permits, so a
    // concurrent accept still sees every free delivery slot.
    outstanding: Arc<AtomicUsize>,
    drained: Arc<Notify>,
    wait_timeout: Duration,
}

impl DetachedTransport {
    pub fn new(sink: Arc<dyn EndpointSink>, options: &Options, reporter: Arc<Reporter>) -> Self {
        Self {
            sink,
            permits: Arc::new(Semaphore::new(options.max_in_flight)),
            limit: options.max_in_flight,
            reporter,
            outstanding: Arc::new(AtomicUsize::new(0)),
            drained: Arc::new(Notify::new()),
            wait_timeout: options.wait_timeout,
        }
    }

    /// Spawn one delivery task for the envelope
    ///
    /// Must be called within a tokio runtime. Succeeds once the task is
    /// spawned; fails synchronously at the concurrency cap or after close.
    pub fn accept(&self, envelope: Envelope) -> Result<()> {
        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => {
                let err = BeaconError::CapacityExhausted { limit: self.limit };
                self.reporter.report(&err);
                return Err(err);
            }
            Err(TryAcquireError::Closed) => {
                let err = BeaconError::Closed;
                self.reporter.report(&err);
                return Err(err);
            }
        };

        self.outstanding.fetch_add(1, Ordering::SeqCst);

        let sink = Arc::clone(&self.sink);
        let reporter = Arc::clone(&self.reporter);
        let outstanding = Arc::clone(&self.outstanding);
        let drained = Arc::clone(&self.drained);
        tokio::spawn(async move {
            if let Err(err) = sink.deliver(std::slice::from_ref(&envelope)).await {
                reporter.report(&err);
            } else {
                debug!("detached delivery completed");
            }
            drop(permit);
            if outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
                drained.notify_waiters();
            }
        });

        Ok(())
    }

    /// Wait for outstanding deliveries, bounded by the configured timeout
    ///
    /// Only observes the outstanding count; delivery slots stay available
    /// to concurrent accepts the whole time.
    pub async fn flush(&self) {
        let wait = async {
            loop {
                let notified = self.drained.notified();
                tokio::pin!(notified);
                // Register before checking the count so a worker finishing
                // in between still wakes this waiter.
                notified.as_mut().enable();
                if self.outstanding.load(Ordering::SeqCst) == 0 {
                    return;
                }
                notified.await;
            }
        };

        if timeout(self.wait_timeout, wait).await.is_err() {
            warn!("flush wait expired with detached deliveries outstanding");
        }
    }

    /// Drain outstanding deliveries, then refuse further accepts
    pub async fn close(&self) {
        self.flush().await;
        self.permits.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{EnvelopeBuilder, EventKind};
    use crate::transport::testutil::{HandlerProbe, RecordingSink};
    use serde_json::json;

    fn envelope(n: usize) -> Envelope {
        let fields = match json!({"userId": n.to_string(), "event": "e"}) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        EnvelopeBuilder::new().build(fields, EventKind::Track)
    }

    fn transport(
        sink: Arc<RecordingSink>,
        opts: &Options,
    ) -> DetachedTransport {
        let reporter = Arc::new(Reporter::new(opts, "key"));
        DetachedTransport::new(sink, opts, reporter)
    }

    #[tokio::test]
    async fn test_accept_spawns_and_delivers() {
        let sink = RecordingSink::new();
        let t = transport(sink.clone(), &Options::default());

        for n in 0..3 {
            t.accept(envelope(n)).unwrap();
        }
        t.flush().await;

        // One single-envelope batch per accept.
        assert_eq!(sink.batch_count(), 3);
        assert_eq!(sink.delivered(), 3);
    }

    #[tokio::test]
    async fn test_cap_fails_synchronously() {
        let mut opts = Options::default();
        opts.max_in_flight = 2;
        let probe = HandlerProbe::new();
        opts.error_handler = Some(probe.handler());

        // Slow sink keeps both workers outstanding.
        let sink = RecordingSink::slow(Duration::from_millis(200));
        let t = transport(sink.clone(), &opts);

        t.accept(envelope(0)).unwrap();
        t.accept(envelope(1)).unwrap();
        let err = t.accept(envelope(2)).unwrap_err();
        assert!(matches!(err, BeaconError::CapacityExhausted { limit: 2 }));
        assert_eq!(probe.count(), 1);

        t.flush().await;
        assert_eq!(sink.delivered(), 2);
    }

    #[tokio::test]
    async fn test_accept_during_flush_keeps_free_capacity() {
        let mut opts = Options::default();
        let probe = HandlerProbe::new();
        opts.error_handler = Some(probe.handler());

        let sink = RecordingSink::slow(Duration::from_millis(100));
        let t = Arc::new(transport(sink.clone(), &opts));

        // One of the 64 delivery slots in use while the flush waits.
        t.accept(envelope(0)).unwrap();
        let flusher = tokio::spawn({
            let t = Arc::clone(&t);
            async move { t.flush().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Far below the cap, so the in-progress flush must not starve it.
        t.accept(envelope(1)).unwrap();

        flusher.await.unwrap();
        t.flush().await;
        assert_eq!(sink.delivered(), 2);
        assert_eq!(probe.count(), 0);
    }

    #[tokio::test]
    async fn test_worker_failure_reaches_handler_only() {
        let mut opts = Options::default();
        let probe = HandlerProbe::new();
        opts.error_handler = Some(probe.handler());

        let sink = RecordingSink::failing(1);
        let t = transport(sink.clone(), &opts);

        // Accept succeeds even though delivery will fail.
        t.accept(envelope(0)).unwrap();
        t.flush().await;

        assert_eq!(probe.count(), 1);
        assert_eq!(sink.delivered(), 0);

        // Next delivery succeeds; the transport is still usable.
        t.accept(envelope(1)).unwrap();
        t.flush().await;
        assert_eq!(sink.delivered(), 1);
    }

    #[tokio::test]
    async fn test_close_refuses_further_accepts() {
        let sink = RecordingSink::new();
        let t = transport(sink.clone(), &Options::default());

        t.accept(envelope(0)).unwrap();
        t.close().await;

        assert_eq!(sink.delivered(), 1);
        assert!(matches!(t.accept(envelope(1)), Err(BeaconError::Closed)));
    }
}
