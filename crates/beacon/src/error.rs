//! Error types for the client and its transports

use thiserror::Error;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, BeaconError>;

/// Errors that can occur while accepting or delivering envelopes
///
/// Only acceptance-time failures (`QueueFull`, `CapacityExhausted`,
/// `Serialization`, `Io`, `Closed`) are ever returned to callers. Failures
/// after an envelope has been accepted are reported exclusively through
/// the configured error handler, since the submitting call has already
/// returned.
#[derive(Debug, Error)]
pub enum BeaconError {
    /// Delivery queue is at capacity (non-blocking accept failed)
    #[error("queue full: {queued} envelopes pending")]
    QueueFull {
        /// Envelopes currently queued
        queued: usize,
    },

    /// Too many delivery workers outstanding
    #[error("worker capacity exhausted: {limit} deliveries in flight")]
    CapacityExhausted {
        /// Configured worker cap
        limit: usize,
    },

    /// Network error during delivery
    #[error("network error: {0}")]
    Network(String),

    /// Endpoint returned an error status
    #[error("server error: HTTP {0}")]
    Server(u16),

    /// Envelope could not be serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error (file transport append or sync)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport has been closed
    #[error("transport closed")]
    Closed,
}

impl BeaconError {
    /// Short machine-readable code handed to error handlers
    pub fn code(&self) -> &'static str {
        match self {
            BeaconError::QueueFull { .. } => "queue_full",
            BeaconError::CapacityExhausted { .. } => "capacity_exhausted",
            BeaconError::Network(_) => "network",
            BeaconError::Server(_) => "server",
            BeaconError::Serialization(_) => "serialization",
            BeaconError::Io(_) => "io",
            BeaconError::Closed => "closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_queue_full() {
        let err = BeaconError::QueueFull { queued: 10_000 };
        assert_eq!(err.to_string(), "queue full: 10000 envelopes pending");
        assert_eq!(err.code(), "queue_full");
    }

    #[test]
    fn test_error_display_capacity_exhausted() {
        let err = BeaconError::CapacityExhausted { limit: 64 };
        assert_eq!(
            err.to_string(),
            "worker capacity exhausted: 64 deliveries in flight"
        );
    }

    #[test]
    fn test_error_display_server() {
        let err = BeaconError::Server(503);
        assert_eq!(err.to_string(), "server error: HTTP 503");
        assert_eq!(err.code(), "server");
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err = BeaconError::from(io);
        assert_eq!(err.code(), "io");
    }
}
