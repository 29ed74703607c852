//! Message connection contract and decorators.
//!
//! This module provides:
//! - The connection contract implemented by every transport
//! - The heartbeat decorator that monitors connection liveness
//! - An in-process connection pair for local wiring and tests

pub mod heartbeat;
pub mod lifecycle;
pub mod pair;

pub(crate) mod monitor;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::{TransportError, TransportResult};
use crate::protocol::WireMessage;

pub use heartbeat::HeartbeatConnection;
pub use lifecycle::{Lifecycle, LifecycleWatch};
pub use pair::{pair, InProcessConnection};

/// Contract shared by every bidirectional message connection.
///
/// Cross-cutting concerns are layered on by decoration: a wrapper
/// implements the same trait and delegates to the connection it wraps.
#[async_trait]
pub trait MessageConnection: Send + Sync {
    /// Stable identifier for diagnostics.
    fn name(&self) -> &str;

    /// Enqueue a message for delivery to the peer.
    async fn submit(&self, message: WireMessage) -> TransportResult<()>;

    /// Enqueue a message and wait until the peer acknowledges it.
    ///
    /// With a timeout, a missing acknowledgement resolves to
    /// [`TransportError::AckTimeout`]; without one, the call waits until
    /// the acknowledgement arrives or the connection ends.
    async fn submit_with_ack(
        &self,
        message: WireMessage,
        timeout: Option<Duration>,
    ) -> TransportResult<()>;

    /// Acknowledge the most recently received message.
    async fn acknowledge(&self) -> TransportResult<()>;

    /// Subscribe to the inbound message stream.
    ///
    /// The stream is hot: there is no replay, and subscribers that fall
    /// behind miss messages instead of exerting backpressure.
    fn incoming(&self) -> broadcast::Receiver<WireMessage>;

    /// Subscribe to the lifecycle signal.
    fn lifecycle(&self) -> LifecycleWatch;

    /// Request graceful teardown. Idempotent.
    async fn shutdown(&self);

    /// Request teardown with a failure cause. Idempotent; the first cause
    /// wins.
    async fn shutdown_with(&self, cause: TransportError);
}
