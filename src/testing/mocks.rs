//! In-memory broker for driving a client session in tests
//!
//! [`MockConnector`] hands the session an in-process [`MockChannel`]; the
//! paired [`MockBroker`] receives the other end of every accepted connection
//! as a [`MockSession`] and plays the broker's side of the protocol.

use crate::protocol::{BrokerMessage, ClientMessage, IdGenerator, LoginAckPayload, LoginPayload};
use crate::transport::{Connector, MessageChannel, TransportError};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug)]
struct ConnectorShared {
    sessions: mpsc::UnboundedSender<MockSession>,
    refuse_remaining: AtomicUsize,
    attempts: AtomicUsize,
    hang: AtomicBool,
}

/// Connector that opens in-memory channels
#[derive(Debug, Clone)]
pub struct MockConnector {
    shared: Arc<ConnectorShared>,
}

impl MockConnector {
    pub fn new() -> (Self, MockBroker) {
        let (sessions_tx, sessions_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(ConnectorShared {
            sessions: sessions_tx,
            refuse_remaining: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
            hang: AtomicBool::new(false),
        });
        let broker = MockBroker {
            sessions: sessions_rx,
            shared: Arc::clone(&shared),
        };
        (Self { shared }, broker)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        host: &str,
        port: u16,
    ) -> Result<Box<dyn MessageChannel>, TransportError> {
        self.shared.attempts.fetch_add(1, Ordering::SeqCst);

        if self.shared.hang.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }

        let refused = self
            .shared
            .refuse_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(TransportError::Refused(format!("{host}:{port}")));
        }

        let (to_broker_tx, to_broker_rx) = mpsc::unbounded_channel();
        let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();
        let keep_alive = Arc::new(Mutex::new(None));

        let session = MockSession {
            inbound: to_broker_rx,
            outbound: to_client_tx,
            keep_alive: Arc::clone(&keep_alive),
        };
        if self.shared.sessions.send(session).is_err() {
            return Err(TransportError::Refused("mock broker dropped".to_string()));
        }

        Ok(Box::new(MockChannel {
            to_broker: Some(to_broker_tx),
            from_broker: to_client_rx,
            keep_alive,
        }))
    }
}

/// Broker side of a [`MockConnector`]
#[derive(Debug)]
pub struct MockBroker {
    sessions: mpsc::UnboundedReceiver<MockSession>,
    shared: Arc<ConnectorShared>,
}

impl MockBroker {
    /// Next accepted connection
    pub async fn accept(&mut self) -> Option<MockSession> {
        self.sessions.recv().await
    }

    /// Accept with a deadline
    pub async fn accept_within(&mut self, timeout: Duration) -> Option<MockSession> {
        tokio::time::timeout(timeout, self.accept()).await.ok().flatten()
    }

    /// Refuse the next `count` connection attempts
    pub fn refuse_next(&self, count: usize) {
        self.shared.refuse_remaining.store(count, Ordering::SeqCst);
    }

    /// Make connection attempts hang until cancelled
    pub fn hang_connects(&self, hang: bool) {
        self.shared.hang.store(hang, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.shared.attempts.load(Ordering::SeqCst)
    }
}

/// Client end of an in-memory connection
#[derive(Debug)]
pub struct MockChannel {
    to_broker: Option<mpsc::UnboundedSender<Value>>,
    from_broker: mpsc::UnboundedReceiver<Value>,
    keep_alive: Arc<Mutex<Option<Duration>>>,
}

#[async_trait]
impl MessageChannel for MockChannel {
    async fn send(&mut self, message: Value) -> Result<(), TransportError> {
        match self.to_broker.as_ref() {
            Some(tx) => tx.send(message).map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }

    async fn recv(&mut self) -> Result<Option<Value>, TransportError> {
        Ok(self.from_broker.recv().await)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.to_broker = None;
        self.from_broker.close();
        Ok(())
    }

    fn set_keep_alive(&self, interval: Duration) -> Result<(), TransportError> {
        if let Ok(mut keep_alive) = self.keep_alive.lock() {
            *keep_alive = Some(interval);
        }
        Ok(())
    }
}

/// Broker end of one accepted connection
#[derive(Debug)]
pub struct MockSession {
    inbound: mpsc::UnboundedReceiver<Value>,
    outbound: mpsc::UnboundedSender<Value>,
    keep_alive: Arc<Mutex<Option<Duration>>>,
}

impl MockSession {
    /// Send a broker message. Returns false once the client has hung up.
    pub fn send(&self, message: BrokerMessage) -> bool {
        match serde_json::to_value(&message) {
            Ok(value) => self.send_raw(value),
            Err(_) => false,
        }
    }

    /// Send an arbitrary wire object
    pub fn send_raw(&self, value: Value) -> bool {
        self.outbound.send(value).is_ok()
    }

    /// Next wire object from the client, `None` once it closed the connection
    pub async fn next_raw(&mut self) -> Option<Value> {
        self.inbound.recv().await
    }

    /// Next client message, skipping anything that does not decode
    pub async fn next_message(&mut self) -> Option<ClientMessage> {
        loop {
            let raw = self.next_raw().await?;
            if let Ok(message) = serde_json::from_value(raw) {
                return Some(message);
            }
        }
    }

    /// Next client message other than a heartbeat
    pub async fn next_non_heartbeat(&mut self) -> Option<ClientMessage> {
        loop {
            match self.next_message().await? {
                ClientMessage::Heartbeat(_) => continue,
                other => return Some(other),
            }
        }
    }

    /// Next client message with a deadline
    pub async fn next_message_within(&mut self, timeout: Duration) -> Option<ClientMessage> {
        tokio::time::timeout(timeout, self.next_message())
            .await
            .ok()
            .flatten()
    }

    /// Read the login and answer it with `ack`
    pub async fn handshake(&mut self, ack: LoginAckPayload) -> Option<LoginPayload> {
        match self.next_message().await? {
            ClientMessage::Login(login) => {
                self.send(BrokerMessage::LoginAck(ack));
                Some(login)
            }
            _ => None,
        }
    }

    /// Accept the login without a heartbeat interval
    pub async fn accept_login(&mut self) -> Option<LoginPayload> {
        self.handshake(LoginAckPayload::default()).await
    }

    /// Keep-alive interval the client configured on this connection
    pub fn keep_alive(&self) -> Option<Duration> {
        self.keep_alive.lock().ok().and_then(|guard| *guard)
    }

    /// Wait until the client closes its end, discarding anything it sends
    pub async fn closed(&mut self) {
        while self.inbound.recv().await.is_some() {}
    }

    /// Drop the connection from the broker side
    pub fn disconnect(self) {}
}

/// Deterministic message ids: `msg-1`, `msg-2`, ...
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    next: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn generate(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        format!("msg-{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_connection_round_trip() {
        // Arrange
        let (connector, mut broker) = MockConnector::new();
        let mut channel = connector.connect("broker", 1).await.unwrap();
        let mut session = broker.accept().await.unwrap();

        // Act
        channel.send(json!({"heartbeat": {}})).await.unwrap();
        session.send_raw(json!({"heartbeat": {}}));

        // Assert
        assert_eq!(session.next_raw().await, Some(json!({"heartbeat": {}})));
        assert_eq!(channel.recv().await.unwrap(), Some(json!({"heartbeat": {}})));
        assert_eq!(broker.attempts(), 1);
    }

    #[tokio::test]
    async fn test_refused_connections_are_counted() {
        let (connector, broker) = MockConnector::new();
        broker.refuse_next(2);

        assert!(connector.connect("broker", 1).await.is_err());
        assert!(connector.connect("broker", 1).await.is_err());
        assert!(connector.connect("broker", 1).await.is_ok());
        assert_eq!(broker.attempts(), 3);
    }

    #[tokio::test]
    async fn test_disconnect_ends_client_stream() {
        let (connector, mut broker) = MockConnector::new();
        let mut channel = connector.connect("broker", 1).await.unwrap();
        let session = broker.accept().await.unwrap();

        session.disconnect();

        assert_eq!(channel.recv().await.unwrap(), None);
        assert!(channel.send(json!({})).await.is_err());
    }

    #[tokio::test]
    async fn test_close_is_seen_by_broker() {
        let (connector, mut broker) = MockConnector::new();
        let mut channel = connector.connect("broker", 1).await.unwrap();
        let mut session = broker.accept().await.unwrap();

        channel.set_keep_alive(Duration::from_secs(5)).unwrap();
        channel.close().await.unwrap();

        session.closed().await;
        assert_eq!(session.keep_alive(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_sequential_ids() {
        let ids = SequentialIdGenerator::new();
        assert_eq!(ids.generate(), "msg-1");
        assert_eq!(ids.generate(), "msg-2");
    }
}
