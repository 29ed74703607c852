//! Connection lifecycle signal.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::TransportError;

/// Terminal state of a connection, observed through a watch channel.
///
/// The signal starts `Open` and moves exactly once to `Closed` or
/// `Failed`; subscribers that arrive after the transition still see the
/// terminal value.
#[derive(Debug, Clone, Default)]
pub enum Lifecycle {
    /// The connection is open and exchanging messages.
    #[default]
    Open,
    /// The connection closed gracefully.
    Closed,
    /// The connection terminated with the given cause.
    Failed(Arc<TransportError>),
}

impl Lifecycle {
    /// Check whether the connection has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Lifecycle::Open)
    }

    /// The failure cause, if the connection terminated abnormally.
    pub fn cause(&self) -> Option<&TransportError> {
        match self {
            Lifecycle::Failed(cause) => Some(cause),
            _ => None,
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifecycle::Open => write!(f, "open"),
            Lifecycle::Closed => write!(f, "closed"),
            Lifecycle::Failed(cause) => write!(f, "failed: {}", cause),
        }
    }
}

/// Subscription to a connection's lifecycle signal.
pub type LifecycleWatch = watch::Receiver<Lifecycle>;
