//! # beacon
//!
//! Client-side event tracking SDK with pluggable delivery transports.
//!
//! Callers submit semantic analytics events (track, identify, group, page,
//! screen, alias); the SDK normalizes each into a fully-stamped envelope
//! (payload bucket coerced to an object, context merged with library
//! metadata, RFC 3339 timestamp, UUIDv4 message id) and hands it to the
//! configured transport.
//!
//! ## Transports
//!
//! - **Queued batch** (default): envelopes queue in memory and a
//!   background worker ships them as JSON-array batches, with bounded
//!   retries and backoff. A full queue fails `accept` synchronously.
//! - **Detached**: one fire-and-forget delivery task per envelope, capped
//!   by a concurrency limit. An accepted data-loss mode.
//! - **File**: newline-delimited JSON appended to a local file for offline
//!   processing or replay.
//!
//! Acceptance is decoupled from delivery: call methods succeed once the
//! envelope enters the pipeline, and later failures reach only the
//! configured error handler. Delivery is best-effort everywhere.
//!
//! ## Quick start
//!
//! ```no_run
//! use beacon::{Client, Options};
//! use serde_json::{json, Map};
//!
//! # async fn run() -> beacon::Result<()> {
//! let client = Client::new("YOUR_WRITE_KEY", Options::default())?;
//!
//! let mut message = Map::new();
//! message.insert("userId".into(), json!("user-42"));
//! message.insert("event".into(), json!("Signed Up"));
//! message.insert("properties".into(), json!({"plan": "pro"}));
//! client.track(message)?;
//!
//! // Close on every exit path; there is no flush on drop.
//! client.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Shutdown
//!
//! `flush()` and `close()` are bounded waits: they return within the
//! configured `wait_timeout` regardless of delivery outcome, surfacing
//! residual failures through the error handler. `close()` is idempotent;
//! accepts after close fail with [`BeaconError::Closed`].

mod client;
mod config;
mod envelope;
mod error;
mod net;
mod transport;

pub use client::Client;
pub use config::{ErrorHandler, Options, TransportKind};
pub use envelope::{Envelope, EventKind, LIBRARY_NAME, LIBRARY_VERSION};
pub use error::{BeaconError, Result};
pub use net::{default_endpoint, EndpointSink, HttpSink};
