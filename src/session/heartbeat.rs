//! Pure heartbeat scheduling and liveness detection
//!
//! Given a broker-declared interval the session checks every `interval / 10`:
//! an outbound heartbeat is due once 45% of the interval passed without any
//! send, and the connection is lost once a full interval passed without any
//! inbound message.

use std::time::Duration;
use tokio::time::Instant;

/// Share of the interval after which an idle sender emits a heartbeat
pub const HEARTBEAT_SEND_PERCENT: u32 = 45;

/// Number of checks per heartbeat interval
pub const CHECKS_PER_INTERVAL: u32 = 10;

/// What the session should do at a heartbeat check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    Idle,
    SendHeartbeat,
    ConnectionLost,
}

#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    interval: Duration,
    last_sent: Instant,
    last_received: Instant,
}

impl HeartbeatMonitor {
    /// Both timestamps start at `now`, the moment the handshake completed
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            last_sent: now,
            last_received: now,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Period of the recurring check
    pub fn check_period(&self) -> Duration {
        (self.interval / CHECKS_PER_INTERVAL).max(Duration::from_millis(1))
    }

    pub fn send_threshold(&self) -> Duration {
        self.interval * HEARTBEAT_SEND_PERCENT / 100
    }

    pub fn record_sent(&mut self, now: Instant) {
        self.last_sent = now;
    }

    pub fn record_received(&mut self, now: Instant) {
        self.last_received = now;
    }

    /// Liveness is checked before the send schedule (pure function)
    pub fn evaluate(&self, now: Instant) -> HeartbeatAction {
        if now.saturating_duration_since(self.last_received) > self.interval {
            return HeartbeatAction::ConnectionLost;
        }
        if now.saturating_duration_since(self.last_sent) > self.send_threshold() {
            return HeartbeatAction::SendHeartbeat;
        }
        HeartbeatAction::Idle
    }
}
