//! Per-session metrics
//!
//! Atomic counters updated by the session task and readable from any client
//! handle. Each client owns its own [`SessionMetrics`]; there is no global
//! registry, so several clients in one process do not mix their numbers.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Thread-safe session counters
#[derive(Debug, Default)]
pub struct SessionMetrics {
    connected: AtomicBool,
    connection_attempts: AtomicU64,
    connections_established: AtomicU64,
    connection_failures: AtomicU64,
    disconnections: AtomicU64,

    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    messages_dropped: AtomicU64,

    heartbeats_sent: AtomicU64,
    heartbeats_lost: AtomicU64,
    last_received_at: AtomicU64,

    publishes_sent: AtomicU64,
    publishes_acked: AtomicU64,
    publishes_rejected: AtomicU64,
    publishes_timed_out: AtomicU64,
    pending_swept: AtomicU64,

    deliveries_received: AtomicU64,
    delivery_acks_sent: AtomicU64,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    // Connection lifecycle

    pub fn connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_established(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
        self.connected.store(true, Ordering::Relaxed);
    }

    pub fn connection_failed(&self) {
        self.connection_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_lost(&self) {
        if self.connected.swap(false, Ordering::Relaxed) {
            self.disconnections.fetch_add(1, Ordering::Relaxed);
        }
    }

    // Traffic

    pub fn message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.last_received_at
            .store(current_timestamp(), Ordering::Relaxed);
    }

    pub fn message_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn heartbeat_sent(&self) {
        self.heartbeats_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn heartbeat_lost(&self) {
        self.heartbeats_lost.fetch_add(1, Ordering::Relaxed);
    }

    // Publishing

    pub fn publish_sent(&self) {
        self.publishes_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn publish_acked(&self) {
        self.publishes_acked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn publish_rejected(&self) {
        self.publishes_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn publish_timed_out(&self) {
        self.publishes_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pending_swept(&self, count: usize) {
        self.pending_swept
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    // Deliveries

    pub fn delivery_received(&self) {
        self.deliveries_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delivery_ack_sent(&self) {
        self.delivery_acks_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connection: ConnectionMetrics {
                connected: self.connected.load(Ordering::Relaxed),
                attempts: self.connection_attempts.load(Ordering::Relaxed),
                established: self.connections_established.load(Ordering::Relaxed),
                failures: self.connection_failures.load(Ordering::Relaxed),
                disconnections: self.disconnections.load(Ordering::Relaxed),
            },
            traffic: TrafficMetrics {
                messages_sent: self.messages_sent.load(Ordering::Relaxed),
                messages_received: self.messages_received.load(Ordering::Relaxed),
                messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
                heartbeats_sent: self.heartbeats_sent.load(Ordering::Relaxed),
                heartbeats_lost: self.heartbeats_lost.load(Ordering::Relaxed),
                last_received_at: self.last_received_at.load(Ordering::Relaxed),
            },
            publish: PublishMetrics {
                sent: self.publishes_sent.load(Ordering::Relaxed),
                acked: self.publishes_acked.load(Ordering::Relaxed),
                rejected: self.publishes_rejected.load(Ordering::Relaxed),
                timed_out: self.publishes_timed_out.load(Ordering::Relaxed),
                swept: self.pending_swept.load(Ordering::Relaxed),
            },
            delivery: DeliveryMetrics {
                received: self.deliveries_received.load(Ordering::Relaxed),
                acks_sent: self.delivery_acks_sent.load(Ordering::Relaxed),
            },
            timestamp: current_timestamp(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub connection: ConnectionMetrics,
    pub traffic: TrafficMetrics,
    pub publish: PublishMetrics,
    pub delivery: DeliveryMetrics,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionMetrics {
    pub connected: bool,
    pub attempts: u64,
    pub established: u64,
    pub failures: u64,
    pub disconnections: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrafficMetrics {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub messages_dropped: u64,
    pub heartbeats_sent: u64,
    pub heartbeats_lost: u64,
    /// Unix seconds of the last inbound message, 0 if none
    pub last_received_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishMetrics {
    pub sent: u64,
    pub acked: u64,
    pub rejected: u64,
    pub timed_out: u64,
    pub swept: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryMetrics {
    pub received: u64,
    pub acks_sent: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_counters() {
        let metrics = SessionMetrics::new();

        metrics.connection_attempt();
        metrics.connection_failed();
        metrics.connection_attempt();
        metrics.connection_established();

        let snapshot = metrics.snapshot();
        assert!(snapshot.connection.connected);
        assert_eq!(snapshot.connection.attempts, 2);
        assert_eq!(snapshot.connection.failures, 1);
        assert_eq!(snapshot.connection.established, 1);
    }

    #[test]
    fn test_connection_lost_counts_once_per_connection() {
        let metrics = SessionMetrics::new();
        metrics.connection_established();

        metrics.connection_lost();
        metrics.connection_lost();

        let snapshot = metrics.snapshot();
        assert!(!snapshot.connection.connected);
        assert_eq!(
            snapshot.connection.disconnections, 1,
            "a second close without reconnect is not a new disconnection"
        );
    }

    #[test]
    fn test_publish_counters() {
        let metrics = SessionMetrics::new();
        metrics.publish_sent();
        metrics.publish_sent();
        metrics.publish_acked();
        metrics.publish_timed_out();
        metrics.pending_swept(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.publish.sent, 2);
        assert_eq!(snapshot.publish.acked, 1);
        assert_eq!(snapshot.publish.timed_out, 1);
        assert_eq!(snapshot.publish.swept, 3);
    }

    #[test]
    fn test_received_stamps_timestamp() {
        let metrics = SessionMetrics::new();
        assert_eq!(metrics.snapshot().traffic.last_received_at, 0);

        metrics.message_received();

        assert!(metrics.snapshot().traffic.last_received_at > 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = SessionMetrics::new();
        metrics.delivery_received();

        let json = serde_json::to_value(metrics.snapshot()).unwrap();

        assert_eq!(json["delivery"]["received"], 1);
        assert_eq!(json["connection"]["connected"], false);
    }
}
