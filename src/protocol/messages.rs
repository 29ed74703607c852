//! Transport protocol messages.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Zero-payload liveness marker.
///
/// Any two markers are equal and hash identically; liveness is signalled
/// by the type alone, never by content. The marker carries no timestamp or
/// sequence number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Heartbeat;

/// A framed unit carried by a message connection.
///
/// Heartbeats and application payloads are discrete framed units on one
/// serialized channel, so they may interleave freely on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireMessage {
    /// Liveness marker, consumed by the transport layer.
    Heartbeat(Heartbeat),
    /// Application payload, opaque to the transport layer.
    Payload(Bytes),
}

impl WireMessage {
    /// Create a heartbeat message.
    pub fn heartbeat() -> Self {
        WireMessage::Heartbeat(Heartbeat)
    }

    /// Create a payload message from raw bytes.
    pub fn payload(data: impl Into<Bytes>) -> Self {
        WireMessage::Payload(data.into())
    }

    /// Check whether this message is a liveness marker.
    pub fn is_heartbeat(&self) -> bool {
        matches!(self, WireMessage::Heartbeat(_))
    }

    /// Get a human-readable name for the message type.
    pub fn name(&self) -> &'static str {
        match self {
            WireMessage::Heartbeat(_) => "heartbeat",
            WireMessage::Payload(_) => "payload",
        }
    }
}

impl fmt::Display for WireMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireMessage::Heartbeat(_) => write!(f, "Heartbeat"),
            WireMessage::Payload(data) => write!(f, "Payload({} bytes)", data.len()),
        }
    }
}
