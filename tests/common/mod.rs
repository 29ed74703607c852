//! Shared helpers for the acceptance tests.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use beacon_transport::{
    pair, HeartbeatConfig, HeartbeatConnection, InProcessConnection, WireMessage,
};

/// Standard test timing: 1 s heartbeat interval, tolerance of 2.
pub fn test_config() -> HeartbeatConfig {
    HeartbeatConfig::new(Duration::from_millis(1000), 2).unwrap()
}

/// Wrap the local end of a fresh pair in a heartbeat decorator.
///
/// Returns the decorated connection, the bare local delegate and the
/// remote endpoint.
pub fn decorated_pair(
    config: HeartbeatConfig,
) -> (
    HeartbeatConnection,
    Arc<InProcessConnection>,
    Arc<InProcessConnection>,
) {
    let (local, remote) = pair("local", "remote");
    let local = Arc::new(local);
    let remote = Arc::new(remote);
    let decorated = HeartbeatConnection::new(local.clone(), config);
    (decorated, local, remote)
}

/// Drain everything currently buffered on a subscription.
pub fn drain(rx: &mut broadcast::Receiver<WireMessage>) -> Vec<WireMessage> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}

/// Count the heartbeat markers in a batch of drained messages.
pub fn count_heartbeats(messages: &[WireMessage]) -> usize {
    messages.iter().filter(|m| m.is_heartbeat()).count()
}
