//! In-process connection pair.
//!
//! Two cross-wired endpoints that deliver messages to each other through
//! hot broadcast channels. Used to wire components living in the same
//! process and as the concrete transport in tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, watch, Mutex};

use crate::error::{TransportError, TransportResult};
use crate::protocol::WireMessage;

use super::lifecycle::{Lifecycle, LifecycleWatch};
use super::MessageConnection;

/// Capacity of each endpoint's inbound channel.
const INBOUND_CHANNEL_CAPACITY: usize = 256;

/// Capacity of each endpoint's acknowledgement lane.
const ACK_CHANNEL_CAPACITY: usize = 16;

/// One endpoint of an in-process connection.
///
/// Closing either endpoint closes the whole link: the closing end records
/// the cause on its own lifecycle, the peer observes a plain close.
pub struct InProcessConnection {
    name: String,
    /// Delivers into the peer's inbound channel.
    peer_inbound_tx: broadcast::Sender<WireMessage>,
    /// Our own inbound channel, handed out by `incoming`.
    inbound_tx: broadcast::Sender<WireMessage>,
    /// Acknowledgements we send to the peer's pending submissions.
    peer_ack_tx: mpsc::Sender<()>,
    /// Acknowledgements addressed to our pending submissions.
    ack_rx: Mutex<mpsc::Receiver<()>>,
    /// Our lifecycle signal.
    lifecycle_tx: Arc<watch::Sender<Lifecycle>>,
    /// The peer's lifecycle signal, completed when we close the link.
    peer_lifecycle_tx: Arc<watch::Sender<Lifecycle>>,
    /// Set once when either end closes the link.
    link_closed: Arc<AtomicBool>,
}

/// Create a connected pair of in-process endpoints.
pub fn pair(
    left: impl Into<String>,
    right: impl Into<String>,
) -> (InProcessConnection, InProcessConnection) {
    let (left_inbound_tx, _) = broadcast::channel(INBOUND_CHANNEL_CAPACITY);
    let (right_inbound_tx, _) = broadcast::channel(INBOUND_CHANNEL_CAPACITY);
    let (left_ack_tx, left_ack_rx) = mpsc::channel(ACK_CHANNEL_CAPACITY);
    let (right_ack_tx, right_ack_rx) = mpsc::channel(ACK_CHANNEL_CAPACITY);
    let left_lifecycle_tx = Arc::new(watch::channel(Lifecycle::Open).0);
    let right_lifecycle_tx = Arc::new(watch::channel(Lifecycle::Open).0);
    let link_closed = Arc::new(AtomicBool::new(false));

    let left_end = InProcessConnection {
        name: left.into(),
        peer_inbound_tx: right_inbound_tx.clone(),
        inbound_tx: left_inbound_tx.clone(),
        peer_ack_tx: right_ack_tx,
        ack_rx: Mutex::new(left_ack_rx),
        lifecycle_tx: left_lifecycle_tx.clone(),
        peer_lifecycle_tx: right_lifecycle_tx.clone(),
        link_closed: link_closed.clone(),
    };

    let right_end = InProcessConnection {
        name: right.into(),
        peer_inbound_tx: left_inbound_tx,
        inbound_tx: right_inbound_tx,
        peer_ack_tx: left_ack_tx,
        ack_rx: Mutex::new(right_ack_rx),
        lifecycle_tx: right_lifecycle_tx,
        peer_lifecycle_tx: left_lifecycle_tx,
        link_closed,
    };

    (left_end, right_end)
}

impl InProcessConnection {
    fn ensure_open(&self) -> TransportResult<()> {
        if self.link_closed.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed(self.name.clone()));
        }
        Ok(())
    }

    fn close(&self, cause: Option<TransportError>) {
        if self.link_closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let terminal = match cause {
            Some(cause) => {
                tracing::debug!(
                    connection = %self.name,
                    error = %cause,
                    "closing connection with cause"
                );
                Lifecycle::Failed(Arc::new(cause))
            }
            None => {
                tracing::debug!(connection = %self.name, "closing connection");
                Lifecycle::Closed
            }
        };
        self.lifecycle_tx.send_replace(terminal);
        // The peer observes a plain close regardless of why this end went
        // away.
        self.peer_lifecycle_tx.send_replace(Lifecycle::Closed);
    }
}

#[async_trait]
impl MessageConnection for InProcessConnection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, message: WireMessage) -> TransportResult<()> {
        self.ensure_open()?;
        // Delivery is fire-and-forget: with no subscribers on the peer end
        // the message is dropped, matching hot-stream semantics.
        let _ = self.peer_inbound_tx.send(message);
        Ok(())
    }

    async fn submit_with_ack(
        &self,
        message: WireMessage,
        timeout: Option<Duration>,
    ) -> TransportResult<()> {
        self.submit(message).await?;
        let mut ack_rx = self.ack_rx.lock().await;
        let received = match timeout {
            Some(window) => tokio::time::timeout(window, ack_rx.recv())
                .await
                .map_err(|_| TransportError::AckTimeout(window))?,
            None => {
                let mut lifecycle = self.lifecycle_tx.subscribe();
                if lifecycle.borrow().is_terminal() {
                    None
                } else {
                    tokio::select! {
                        received = ack_rx.recv() => received,
                        // The link closed while we were waiting.
                        _ = lifecycle.changed() => None,
                    }
                }
            }
        };
        match received {
            Some(()) => Ok(()),
            None => Err(TransportError::ConnectionClosed(self.name.clone())),
        }
    }

    async fn acknowledge(&self) -> TransportResult<()> {
        self.ensure_open()?;
        self.peer_ack_tx
            .send(())
            .await
            .map_err(|_| TransportError::ConnectionClosed(self.name.clone()))
    }

    fn incoming(&self) -> broadcast::Receiver<WireMessage> {
        self.inbound_tx.subscribe()
    }

    fn lifecycle(&self) -> LifecycleWatch {
        self.lifecycle_tx.subscribe()
    }

    async fn shutdown(&self) {
        self.close(None);
    }

    async fn shutdown_with(&self, cause: TransportError) {
        self.close(Some(cause));
    }
}
