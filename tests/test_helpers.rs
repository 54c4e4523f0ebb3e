//! Test helpers and utilities for integration tests

use enginemq_client::config::ClientConfig;
use enginemq_client::protocol::{ClientMessage, LoginAckPayload};
use enginemq_client::session::CLIENT_VERSION;
use enginemq_client::testing::{MockBroker, MockConnector, MockSession, SequentialIdGenerator};
use enginemq_client::{ClientEvent, EngineClient, EventReceiver};
use std::time::Duration;

/// Upper bound for anything a test waits on
#[allow(dead_code)]
pub const WAIT: Duration = Duration::from_secs(30);

/// Create a test configuration with a short reconnect window
#[allow(dead_code)]
pub fn test_config() -> ClientConfig {
    let mut config = ClientConfig::default();
    config.client.id = "Test-Worker".to_string();
    config.client.max_workers = 2;
    config.reconnect.max_wait_ms = 50;
    config.publish.timeout_ms = 1000;
    config
}

/// Build a client wired to an in-memory broker
#[allow(dead_code)]
pub fn start_client(config: ClientConfig) -> (EngineClient, EventReceiver, MockBroker) {
    let (connector, broker) = MockConnector::new();
    let (client, events) = EngineClient::builder(config)
        .connector(connector)
        .id_generator(SequentialIdGenerator::new())
        .build()
        .expect("client should build");
    (client, events, broker)
}

/// Next event, failing the test if none arrives
#[allow(dead_code)]
pub async fn next_event(events: &mut EventReceiver) -> ClientEvent {
    tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event stream ended")
}

/// Skip events until one matches
#[allow(dead_code)]
pub async fn wait_for_event<F>(events: &mut EventReceiver, mut matches: F) -> ClientEvent
where
    F: FnMut(&ClientEvent) -> bool,
{
    loop {
        let event = next_event(events).await;
        if matches(&event) {
            return event;
        }
    }
}

/// Login acknowledgment carrying this client's own version
#[allow(dead_code)]
pub fn compatible_ack() -> LoginAckPayload {
    LoginAckPayload {
        version: Some(CLIENT_VERSION.to_string()),
        ..Default::default()
    }
}

/// Connect, accept the login with `ack` and wait for `Ready`.
/// Returns the broker session and the subscription set sent after login.
#[allow(dead_code)]
pub async fn connect_with(
    client: &EngineClient,
    events: &mut EventReceiver,
    broker: &mut MockBroker,
    ack: LoginAckPayload,
) -> (MockSession, Vec<String>) {
    client.connect().expect("connect command");
    let mut session = tokio::time::timeout(WAIT, broker.accept())
        .await
        .expect("timed out waiting for a connection")
        .expect("connector dropped");
    session.handshake(ack).await.expect("client should log in");
    wait_for_event(events, |e| matches!(e, ClientEvent::Ready { .. })).await;

    let subscriptions = match session.next_non_heartbeat().await {
        Some(ClientMessage::Subscribe(payload)) => payload.subscriptions,
        other => panic!("expected subscription resync after login, got {other:?}"),
    };
    (session, subscriptions)
}

/// Connect with a plain login acknowledgment (no heartbeat interval)
#[allow(dead_code)]
pub async fn connect_ready(
    client: &EngineClient,
    events: &mut EventReceiver,
    broker: &mut MockBroker,
) -> MockSession {
    connect_with(client, events, broker, compatible_ack()).await.0
}
