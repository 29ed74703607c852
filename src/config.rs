//! Heartbeat configuration.

use std::time::Duration;

use crate::error::{TransportError, TransportResult};

/// Liveness settings for a heartbeat-decorated connection.
///
/// Both values are mandatory and validated at construction; there are no
/// implicit defaults. The interval is the period between local heartbeat
/// attempts, the tolerance is the maximum drift (sent-but-unanswered
/// heartbeats) before the connection is declared dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    interval: Duration,
    tolerance: u32,
}

impl HeartbeatConfig {
    /// Validate and create a heartbeat configuration.
    pub fn new(interval: Duration, tolerance: u32) -> TransportResult<Self> {
        if interval.is_zero() {
            return Err(TransportError::InvalidConfig(
                "heartbeat interval must be positive".to_string(),
            ));
        }
        if tolerance == 0 {
            return Err(TransportError::InvalidConfig(
                "heartbeat tolerance must be positive".to_string(),
            ));
        }
        Ok(Self {
            interval,
            tolerance,
        })
    }

    /// Period between local heartbeat attempts.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Maximum drift before the connection is declared dead.
    pub fn tolerance(&self) -> u32 {
        self.tolerance
    }
}
