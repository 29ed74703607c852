//! Heartbeat decorator for message connections.
//!
//! Wraps a delegate connection, periodically submits heartbeats through
//! it, consumes the heartbeats the peer sends back, and tears the
//! connection down when the peer stops answering. Heartbeats never reach
//! subscribers of the decorated connection; every other inbound message is
//! forwarded in its original order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, watch};

use crate::config::HeartbeatConfig;
use crate::error::{TransportError, TransportResult};
use crate::protocol::WireMessage;

use super::lifecycle::LifecycleWatch;
use super::monitor::HeartbeatMonitor;
use super::MessageConnection;

/// Capacity of the filtered inbound channel. Subscribers that fall more
/// than this many messages behind miss the overflow.
const FILTERED_CHANNEL_CAPACITY: usize = 256;

/// A connection decorator that monitors liveness with heartbeats.
///
/// Teardown can be triggered by the caller, by the delegate's own
/// lifecycle, or by the monitor; whichever fires first runs the internal
/// teardown (stop the timer, cancel the filter), and the rest are no-ops.
pub struct HeartbeatConnection {
    delegate: Arc<dyn MessageConnection>,
    filtered_tx: broadcast::Sender<WireMessage>,
    teardown: Teardown,
}

impl HeartbeatConnection {
    /// Wrap `delegate`, start monitoring it, and begin filtering its
    /// inbound stream. The heartbeat timer starts immediately.
    pub fn new(delegate: Arc<dyn MessageConnection>, config: HeartbeatConfig) -> Self {
        let (filtered_tx, _) = broadcast::channel(FILTERED_CHANNEL_CAPACITY);
        let monitor = HeartbeatMonitor::new();
        let teardown = Teardown::new(monitor.clone());

        // The filter and lifecycle tasks subscribe to the cancel signal
        // before the monitor starts, so a teardown can never outrun them.
        spawn_filter_task(
            delegate.clone(),
            filtered_tx.clone(),
            monitor.clone(),
            teardown.clone(),
        );
        spawn_lifecycle_task(delegate.clone(), teardown.clone());

        let (fatal_tx, fatal_rx) = mpsc::channel(1);
        spawn_fatal_task(delegate.clone(), teardown.clone(), fatal_rx);
        monitor.start(delegate.clone(), config, fatal_tx);

        Self {
            delegate,
            filtered_tx,
            teardown,
        }
    }

    /// Current drift: heartbeats sent but not yet answered by the peer.
    pub fn drift(&self) -> i64 {
        self.teardown.monitor.drift()
    }
}

#[async_trait]
impl MessageConnection for HeartbeatConnection {
    fn name(&self) -> &str {
        self.delegate.name()
    }

    async fn submit(&self, message: WireMessage) -> TransportResult<()> {
        self.delegate.submit(message).await
    }

    async fn submit_with_ack(
        &self,
        message: WireMessage,
        timeout: Option<Duration>,
    ) -> TransportResult<()> {
        self.delegate.submit_with_ack(message, timeout).await
    }

    async fn acknowledge(&self) -> TransportResult<()> {
        self.delegate.acknowledge().await
    }

    /// The filtered inbound stream: heartbeats are consumed internally and
    /// never appear here.
    fn incoming(&self) -> broadcast::Receiver<WireMessage> {
        self.filtered_tx.subscribe()
    }

    /// Direct passthrough of the delegate's lifecycle signal; this layer
    /// adds no externally visible state of its own.
    fn lifecycle(&self) -> LifecycleWatch {
        self.delegate.lifecycle()
    }

    async fn shutdown(&self) {
        self.teardown.run();
        self.delegate.shutdown().await;
    }

    async fn shutdown_with(&self, cause: TransportError) {
        self.teardown.run();
        self.delegate.shutdown_with(cause).await;
    }
}

impl Drop for HeartbeatConnection {
    fn drop(&mut self) {
        // Stops the timer and background tasks if the caller never shut
        // the connection down explicitly.
        self.teardown.run();
    }
}

/// Single-execution guard around the internal teardown sequence.
#[derive(Clone)]
struct Teardown {
    monitor: HeartbeatMonitor,
    shared: Arc<TeardownShared>,
}

struct TeardownShared {
    done: AtomicBool,
    cancel_tx: watch::Sender<bool>,
}

impl Teardown {
    fn new(monitor: HeartbeatMonitor) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            monitor,
            shared: Arc::new(TeardownShared {
                done: AtomicBool::new(false),
                cancel_tx,
            }),
        }
    }

    /// Stop the timer and cancel the filter and lifecycle tasks. Returns
    /// whether this call was the one that performed the teardown.
    fn run(&self) -> bool {
        if self.shared.done.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.monitor.stop();
        let _ = self.shared.cancel_tx.send(true);
        true
    }

    fn cancelled(&self) -> watch::Receiver<bool> {
        self.shared.cancel_tx.subscribe()
    }
}

/// Route delegate inbound messages: heartbeats feed the monitor, every
/// other message is forwarded to the decorator's subscribers in order.
fn spawn_filter_task(
    delegate: Arc<dyn MessageConnection>,
    filtered_tx: broadcast::Sender<WireMessage>,
    monitor: HeartbeatMonitor,
    teardown: Teardown,
) {
    let mut inbound = delegate.incoming();
    let mut cancel_rx = teardown.cancelled();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                received = inbound.recv() => match received {
                    Ok(WireMessage::Heartbeat(_)) => {
                        tracing::debug!(
                            connection = %delegate.name(),
                            "received heartbeat"
                        );
                        monitor.on_heartbeat_received();
                    }
                    Ok(message) => {
                        // A send error only means nobody is subscribed
                        // right now; the stream is hot and does not replay.
                        let _ = filtered_tx.send(message);
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::debug!(
                            connection = %delegate.name(),
                            missed,
                            "inbound filter lagged behind the delegate"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = cancel_rx.changed() => break,
            }
        }
    });
}

/// Watch the delegate's lifecycle; when it reaches a terminal state, run
/// the internal teardown without another shutdown call on a delegate that
/// has already ended.
fn spawn_lifecycle_task(delegate: Arc<dyn MessageConnection>, teardown: Teardown) {
    let mut lifecycle = delegate.lifecycle();
    let mut cancel_rx = teardown.cancelled();
    tokio::spawn(async move {
        // The delegate may already have ended before we subscribed.
        if lifecycle.borrow().is_terminal() {
            teardown.run();
            return;
        }
        loop {
            tokio::select! {
                changed = lifecycle.changed() => {
                    if changed.is_err() || lifecycle.borrow().is_terminal() {
                        if teardown.run() {
                            tracing::debug!(
                                connection = %delegate.name(),
                                "delegate ended; heartbeat monitoring stopped"
                            );
                        }
                        break;
                    }
                }
                _ = cancel_rx.changed() => break,
            }
        }
    });
}

/// Receive a fatal cause from the monitor and close the connection with
/// it.
fn spawn_fatal_task(
    delegate: Arc<dyn MessageConnection>,
    teardown: Teardown,
    mut fatal_rx: mpsc::Receiver<TransportError>,
) {
    tokio::spawn(async move {
        if let Some(cause) = fatal_rx.recv().await {
            if teardown.run() {
                delegate.shutdown_with(cause).await;
            } else {
                // Teardown already ran through another trigger; reporting
                // the cause again would be a duplicate.
                tracing::debug!(
                    connection = %delegate.name(),
                    error = %cause,
                    "connection already closed; dropping heartbeat failure"
                );
            }
        }
    });
}
