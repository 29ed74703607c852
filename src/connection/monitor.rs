//! Heartbeat liveness monitor.
//!
//! The monitor owns the periodic heartbeat timer and the drift counter.
//! Drift is incremented once per timer tick and decremented once per
//! received heartbeat; sustained positive drift beyond the tolerance means
//! the peer has stopped answering and the connection must be torn down.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant};

use crate::config::HeartbeatConfig;
use crate::error::TransportError;
use crate::protocol::WireMessage;

use super::MessageConnection;

/// Monitors liveness of one connection by exchanging heartbeats.
///
/// At steady state the drift oscillates around -1, 0 or 1 depending on
/// whether the local timer or the peer's heartbeats run first. Missed
/// heartbeats push it up; once a tick pushes it past the tolerance the
/// monitor reports a fatal timeout instead of sending.
#[derive(Clone)]
pub(crate) struct HeartbeatMonitor {
    shared: Arc<MonitorShared>,
}

struct MonitorShared {
    /// `ticks_elapsed - heartbeats_received`; may go negative.
    drift: AtomicI64,
    /// Set once, by whichever caller stops the monitor first.
    stopped: AtomicBool,
    /// Cancellation signal for the timer task.
    stop_tx: watch::Sender<bool>,
}

impl HeartbeatMonitor {
    pub(crate) fn new() -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(MonitorShared {
                drift: AtomicI64::new(0),
                stopped: AtomicBool::new(false),
                stop_tx,
            }),
        }
    }

    /// Start the periodic timer. The first tick fires one full interval
    /// after this call, then repeats until the monitor is stopped.
    ///
    /// Fatal conditions (timeout, submission failure) are reported through
    /// `fatal_tx` after the timer has stopped itself.
    pub(crate) fn start(
        &self,
        delegate: Arc<dyn MessageConnection>,
        config: HeartbeatConfig,
        fatal_tx: mpsc::Sender<TransportError>,
    ) {
        let monitor = self.clone();
        let mut stop_rx = self.shared.stop_tx.subscribe();
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + config.interval(), config.interval());
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(cause) = monitor.on_tick(&delegate, &config).await {
                            monitor.stop();
                            let _ = fatal_tx.send(cause).await;
                            break;
                        }
                    }
                    _ = stop_rx.changed() => break,
                }
            }
        });
    }

    /// One heartbeat arrived from the peer. No lower bound: negative drift
    /// is surplus acknowledgment and harmless.
    pub(crate) fn on_heartbeat_received(&self) {
        self.shared.drift.fetch_sub(1, Ordering::SeqCst);
    }

    /// One timer tick: account for it, then either send or give up.
    ///
    /// The increment happens before the threshold check so the drift value
    /// at the failure boundary is exact. A successful send requires no
    /// further counter adjustment.
    async fn on_tick(
        &self,
        delegate: &Arc<dyn MessageConnection>,
        config: &HeartbeatConfig,
    ) -> Result<(), TransportError> {
        let drift = self.shared.drift.fetch_add(1, Ordering::SeqCst) + 1;
        if drift > i64::from(config.tolerance()) {
            tracing::warn!(
                connection = %delegate.name(),
                drift,
                tolerance = config.tolerance(),
                "too many heartbeats missed; closing the connection"
            );
            return Err(TransportError::HeartbeatTimeout {
                name: delegate.name().to_string(),
                tolerance: config.tolerance(),
            });
        }

        tracing::debug!(connection = %delegate.name(), drift, "sending heartbeat");
        if let Err(e) = delegate.submit(WireMessage::heartbeat()).await {
            tracing::warn!(
                connection = %delegate.name(),
                error = %e,
                "failed to send heartbeat; terminating the connection"
            );
            return Err(TransportError::HeartbeatSubmission {
                name: delegate.name().to_string(),
                source: Box::new(e),
            });
        }
        Ok(())
    }

    /// Cancel the timer. Safe to call repeatedly and concurrently.
    pub(crate) fn stop(&self) {
        if self.shared.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shared.stop_tx.send(true);
    }

    /// Current drift value.
    pub(crate) fn drift(&self) -> i64 {
        self.shared.drift.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::lifecycle::{Lifecycle, LifecycleWatch};
    use crate::error::TransportResult;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::broadcast;
    use tokio::time::sleep;

    /// Records every submitted message; submission can be made to fail.
    struct StubConnection {
        name: String,
        submitted: Mutex<Vec<WireMessage>>,
        fail_submits: AtomicBool,
        incoming_tx: broadcast::Sender<WireMessage>,
        lifecycle_tx: watch::Sender<Lifecycle>,
    }

    impl StubConnection {
        fn new() -> Arc<Self> {
            let (incoming_tx, _) = broadcast::channel(16);
            let (lifecycle_tx, _) = watch::channel(Lifecycle::Open);
            Arc::new(Self {
                name: "stub".to_string(),
                submitted: Mutex::new(Vec::new()),
                fail_submits: AtomicBool::new(false),
                incoming_tx,
                lifecycle_tx,
            })
        }

        fn submitted_count(&self) -> usize {
            self.submitted.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl MessageConnection for StubConnection {
        fn name(&self) -> &str {
            &self.name
        }

        async fn submit(&self, message: WireMessage) -> TransportResult<()> {
            if self.fail_submits.load(Ordering::SeqCst) {
                return Err(TransportError::ConnectionClosed(self.name.clone()));
            }
            self.submitted.lock().unwrap().push(message);
            Ok(())
        }

        async fn submit_with_ack(
            &self,
            message: WireMessage,
            _timeout: Option<Duration>,
        ) -> TransportResult<()> {
            self.submit(message).await
        }

        async fn acknowledge(&self) -> TransportResult<()> {
            Ok(())
        }

        fn incoming(&self) -> broadcast::Receiver<WireMessage> {
            self.incoming_tx.subscribe()
        }

        fn lifecycle(&self) -> LifecycleWatch {
            self.lifecycle_tx.subscribe()
        }

        async fn shutdown(&self) {}

        async fn shutdown_with(&self, _cause: TransportError) {}
    }

    fn config(interval_ms: u64, tolerance: u32) -> HeartbeatConfig {
        HeartbeatConfig::new(Duration::from_millis(interval_ms), tolerance).unwrap()
    }

    #[test]
    fn test_drift_may_go_negative() {
        let monitor = HeartbeatMonitor::new();
        monitor.on_heartbeat_received();
        monitor.on_heartbeat_received();
        assert_eq!(monitor.drift(), -2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_tick_sends_one_heartbeat() {
        let stub = StubConnection::new();
        let monitor = HeartbeatMonitor::new();
        let (fatal_tx, _fatal_rx) = mpsc::channel(1);
        monitor.start(stub.clone(), config(1000, 5), fatal_tx);

        sleep(Duration::from_millis(500)).await;
        assert_eq!(stub.submitted_count(), 0);

        sleep(Duration::from_millis(600)).await;
        assert_eq!(stub.submitted_count(), 1);
        assert_eq!(monitor.drift(), 1);

        sleep(Duration::from_millis(1000)).await;
        assert_eq!(stub.submitted_count(), 2);
        assert_eq!(monitor.drift(), 2);

        monitor.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reported_once_tolerance_exceeded() {
        let stub = StubConnection::new();
        let monitor = HeartbeatMonitor::new();
        let (fatal_tx, mut fatal_rx) = mpsc::channel(1);
        monitor.start(stub.clone(), config(1000, 2), fatal_tx);

        sleep(Duration::from_millis(2500)).await;
        assert_eq!(stub.submitted_count(), 2);

        sleep(Duration::from_millis(600)).await;
        let cause = fatal_rx.recv().await.expect("fatal cause");
        assert!(matches!(
            cause,
            TransportError::HeartbeatTimeout { tolerance: 2, .. }
        ));
        // nothing was sent on the failing tick and the timer is gone
        assert_eq!(stub.submitted_count(), 2);
        assert_eq!(monitor.drift(), 3);
        assert!(monitor.is_stopped());

        sleep(Duration::from_millis(5000)).await;
        assert_eq!(stub.submitted_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_received_heartbeats_offset_ticks() {
        let stub = StubConnection::new();
        let monitor = HeartbeatMonitor::new();
        let (fatal_tx, mut fatal_rx) = mpsc::channel(1);
        monitor.start(stub.clone(), config(1000, 2), fatal_tx);

        sleep(Duration::from_millis(1500)).await;
        monitor.on_heartbeat_received();

        sleep(Duration::from_millis(1600)).await;
        // ticks at 1000, 2000 and 3000 all stayed within tolerance
        assert_eq!(stub.submitted_count(), 3);
        assert_eq!(monitor.drift(), 2);
        assert!(fatal_rx.try_recv().is_err());

        monitor.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_submission_failure_is_fatal() {
        let stub = StubConnection::new();
        stub.fail_submits.store(true, Ordering::SeqCst);
        let monitor = HeartbeatMonitor::new();
        let (fatal_tx, mut fatal_rx) = mpsc::channel(1);
        monitor.start(stub.clone(), config(1000, 5), fatal_tx);

        sleep(Duration::from_millis(1100)).await;
        let cause = fatal_rx.recv().await.expect("fatal cause");
        assert!(matches!(
            cause,
            TransportError::HeartbeatSubmission { .. }
        ));
        assert!(monitor.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_halts_ticks() {
        let stub = StubConnection::new();
        let monitor = HeartbeatMonitor::new();
        let (fatal_tx, mut fatal_rx) = mpsc::channel(1);
        monitor.start(stub.clone(), config(1000, 2), fatal_tx);

        sleep(Duration::from_millis(1100)).await;
        assert_eq!(stub.submitted_count(), 1);

        monitor.stop();
        monitor.stop();

        sleep(Duration::from_millis(10_000)).await;
        assert_eq!(stub.submitted_count(), 1);
        // the timer task exited without reporting anything
        assert!(fatal_rx.recv().await.is_none());
    }
}
