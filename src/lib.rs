//! Heartbeat-monitored message transport layer.
//!
//! This crate provides the connection plumbing for services that exchange
//! discrete messages over a bidirectional asynchronous channel:
//!
//! - A common connection contract ([`MessageConnection`])
//! - A heartbeat decorator that monitors connection liveness and tears
//!   the connection down when the peer goes quiet
//!   ([`HeartbeatConnection`])
//! - An in-process connection pair for local wiring and tests ([`pair`])
//!
//! # Architecture
//!
//! The heartbeat layer decorates an existing connection; downstream code
//! talks to the decorated connection exactly as it would to the bare one.
//!
//! ```text
//! application
//! ├── incoming()              filtered stream (heartbeats removed)
//! ├── submit()/acknowledge()  passthrough to the delegate
//! └── lifecycle()             the delegate's own terminal signal
//!     HeartbeatConnection
//!     ├── filter task         routes inbound heartbeats to the monitor
//!     ├── lifecycle task      tears down when the delegate ends
//!     └── monitor task        periodic heartbeat timer + drift counter
//!         delegate connection
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use beacon_transport::{pair, HeartbeatConfig, HeartbeatConnection, MessageConnection};
//!
//! let (local, _remote) = pair("local", "remote");
//! let config = HeartbeatConfig::new(Duration::from_secs(30), 3)?;
//! let connection = HeartbeatConnection::new(Arc::new(local), config);
//! let mut incoming = connection.incoming();
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;

pub use config::HeartbeatConfig;
pub use connection::{
    pair, HeartbeatConnection, InProcessConnection, Lifecycle, LifecycleWatch, MessageConnection,
};
pub use error::{TransportError, TransportResult};
pub use protocol::{Heartbeat, WireMessage};
