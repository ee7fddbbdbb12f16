//! Queued batch transport
//!
//! Envelopes accumulate in a bounded FIFO queue; a background worker
//! drains them as JSON-array batches. A flush happens when the queue
//! reaches the batch size, when the interval tick fires (bounding the age
//! of the oldest queued envelope), or on explicit request. At most one
//! batch is in flight at a time; delivery failures retry with exponential
//! backoff and the batch is dropped, once reported, when retries run out.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, warn};

use super::Reporter;
use crate::config::Options;
use crate::envelope::Envelope;
use crate::error::{BeaconError, Result};
use crate::net::EndpointSink;

/// Command channel size; kicks coalesce, so a small buffer suffices
const COMMAND_BUFFER: usize = 8;

enum Command {
    /// Queue reached the batch size; drain full batches
    Kick,
    /// Drain everything, then ack
    Flush(oneshot::Sender<()>),
    /// Final drain, ack, and exit
    Shutdown(oneshot::Sender<()>),
}

pub(crate) struct QueuedBatchTransport {
    queue: Arc<Mutex<VecDeque<Envelope>>>,
    cmd_tx: mpsc::Sender<Command>,
    reporter: Arc<Reporter>,
    batch_size: usize,
    max_queue_size: usize,
    wait_timeout: Duration,
    closed: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl QueuedBatchTransport {
    /// Create the transport and spawn its worker task
    ///
    /// Must be called within a tokio runtime.
    pub fn new(
        sink: Arc<dyn EndpointSink>,
        options: &Options,
        reporter: Arc<Reporter>,
    ) -> Self {
        let queue = Arc::new(Mutex::new(VecDeque::new()));
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

        let worker = Worker {
            queue: Arc::clone(&queue),
            cmd_rx,
            sink,
            reporter: Arc::clone(&reporter),
            batch_size: options.batch_size,
            flush_interval: options.flush_interval,
            max_retries: options.max_retries,
            retry_backoff: options.retry_backoff,
        };
        let handle = tokio::spawn(worker.run());

        Self {
            queue,
            cmd_tx,
            reporter,
            batch_size: options.batch_size,
            max_queue_size: options.max_queue_size,
            wait_timeout: options.wait_timeout,
            closed: AtomicBool::new(false),
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Enqueue one envelope; fails synchronously on a full queue
    pub fn accept(&self, envelope: Envelope) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            let err = BeaconError::Closed;
            self.reporter.report(&err);
            return Err(err);
        }

        let queued = {
            let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            if queue.len() >= self.max_queue_size {
                let err = BeaconError::QueueFull { queued: queue.len() };
                drop(queue);
                self.reporter.report(&err);
                return Err(err);
            }
            queue.push_back(envelope);
            queue.len()
        };

        if queued >= self.batch_size {
            // Coalescing wakeup; a full channel means the worker is
            // already behind on kicks and will catch up.
            let _ = self.cmd_tx.try_send(Command::Kick);
        }

        Ok(())
    }

    /// Drain pending envelopes, waiting at most the configured bound
    pub async fn flush(&self) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        let sent = timeout(self.wait_timeout, self.cmd_tx.send(Command::Flush(ack_tx))).await;
        match sent {
            Ok(Ok(())) => {
                if timeout(self.wait_timeout, ack_rx).await.is_err() {
                    warn!("flush wait expired with deliveries still pending");
                }
            }
            _ => debug!("flush requested on a stopped transport"),
        }
    }

    /// Final drain, then stop the worker; idempotent and bounded
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        let sent = timeout(
            self.wait_timeout,
            self.cmd_tx.send(Command::Shutdown(ack_tx)),
        )
        .await;
        if let Ok(Ok(())) = sent {
            if timeout(self.wait_timeout, ack_rx).await.is_err() {
                warn!("close wait expired; dropping remaining queued envelopes");
            }
        }

        if let Some(handle) = self
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
    }
}

/// Background task draining the queue into the sink
struct Worker {
    queue: Arc<Mutex<VecDeque<Envelope>>>,
    cmd_rx: mpsc::Receiver<Command>,
    sink: Arc<dyn EndpointSink>,
    reporter: Arc<Reporter>,
    batch_size: usize,
    flush_interval: Duration,
    max_retries: u32,
    retry_backoff: Duration,
}

impl Worker {
    async fn run(mut self) {
        let mut tick = interval(self.flush_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately; consume it so the age timer
        // starts from construction.
        tick.tick().await;

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.drain_all().await;
                }
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Kick) => {
                        self.drain_full_batches().await;
                    }
                    Some(Command::Flush(ack)) => {
                        self.drain_all().await;
                        let _ = ack.send(());
                    }
                    Some(Command::Shutdown(ack)) => {
                        self.drain_all().await;
                        let _ = ack.send(());
                        break;
                    }
                    None => {
                        self.drain_all().await;
                        break;
                    }
                },
            }
        }
    }

    /// Send batches while at least a full batch is queued
    async fn drain_full_batches(&self) {
        loop {
            let batch = {
                let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
                if queue.len() < self.batch_size {
                    break;
                }
                queue.drain(..self.batch_size).collect::<Vec<_>>()
            };
            self.send_with_retry(batch).await;
        }
    }

    /// Send everything queued, in batch-size chunks
    async fn drain_all(&self) {
        loop {
            let batch = {
                let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
                if queue.is_empty() {
                    break;
                }
                let take = queue.len().min(self.batch_size);
                queue.drain(..take).collect::<Vec<_>>()
            };
            self.send_with_retry(batch).await;
        }
    }

    /// One batch in flight: deliver with bounded retries, then drop
    async fn send_with_retry(&self, batch: Vec<Envelope>) {
        let mut attempt = 0u32;
        loop {
            match self.sink.deliver(&batch).await {
                Ok(()) => {
                    debug!(count = batch.len(), "batch delivered");
                    return;
                }
                Err(err) if attempt < self.max_retries => {
                    let backoff = self.retry_backoff * 2u32.saturating_pow(attempt);
                    debug!(error = %err, attempt, backoff_ms = backoff.as_millis() as u64,
                        "batch delivery failed, backing off");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => {
                    warn!(count = batch.len(), "dropping batch after exhausting retries");
                    self.reporter.report(&err);
                    return;
                }
            }
        }
    }
}
