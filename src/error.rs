//! Transport error types.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Transport-layer errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// More heartbeats went unanswered than the configured tolerance.
    #[error("connection {name}: more than {tolerance} heartbeats missed")]
    HeartbeatTimeout { name: String, tolerance: u32 },

    /// Writing a heartbeat to the underlying connection failed.
    #[error("connection {name}: heartbeat submission failed: {source}")]
    HeartbeatSubmission {
        name: String,
        #[source]
        source: Box<TransportError>,
    },

    /// Rejected configuration value.
    #[error("invalid heartbeat configuration: {0}")]
    InvalidConfig(String),

    /// The connection is already closed.
    #[error("connection {0} is closed")]
    ConnectionClosed(String),

    /// No acknowledgement arrived within the allowed window.
    #[error("no acknowledgement within {0:?}")]
    AckTimeout(Duration),

    /// I/O error reported by the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
