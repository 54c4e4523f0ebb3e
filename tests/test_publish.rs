//! Publish and acknowledgment correlation tests
//!
//! Each test drives a ready client against the in-memory broker and checks
//! both the wire message and the caller-visible outcome.

mod test_helpers;

use enginemq_client::protocol::{BrokerMessage, ClientMessage, PublishAckPayload, PublishPayload};
use enginemq_client::testing::MockSession;
use enginemq_client::{
    ClientError, EngineClient, MessagePriority, MessageQos, PublishClientOptions, PublishOptions,
    SessionState, ValidationError,
};
use serde_json::{json, Value};
use std::time::Duration;
use test_helpers::*;
use tokio::task::JoinHandle;

fn spawn_publish(
    client: &EngineClient,
    topic: &str,
    message: Value,
    options: PublishOptions,
    client_options: PublishClientOptions,
) -> JoinHandle<Result<String, ClientError>> {
    let client = client.clone();
    let topic = topic.to_string();
    tokio::spawn(async move {
        client
            .publish_with(&topic, message, &options, client_options)
            .await
    })
}

async fn next_publish(session: &mut MockSession) -> PublishPayload {
    match session.next_non_heartbeat().await {
        Some(ClientMessage::Publish(payload)) => payload,
        other => panic!("expected publish, got {other:?}"),
    }
}

fn ack(message_id: &str, error_message: Option<&str>) -> BrokerMessage {
    BrokerMessage::PublishAck(PublishAckPayload {
        message_id: message_id.to_string(),
        error_message: error_message.map(str::to_string),
    })
}

#[tokio::test]
async fn test_publish_resolves_with_message_id_on_ack() {
    // Arrange
    let (client, mut events, mut broker) = start_client(test_config());
    let mut session = connect_ready(&client, &mut events, &mut broker).await;

    // Act
    let publish = spawn_publish(
        &client,
        "Log.Event.Started",
        json!({"pid": 7}),
        PublishOptions::default(),
        PublishClientOptions::default(),
    );
    let payload = next_publish(&mut session).await;
    session.send(ack("MSG-1", None));

    // Assert
    assert_eq!(payload.topic, "log.event.started", "topic is lowercased");
    assert_eq!(payload.message, json!({"pid": 7}));
    assert_eq!(payload.options.message_id, "msg-1");
    assert_eq!(payload.options.qos, MessageQos::Normal);
    assert_eq!(payload.options.priority, MessagePriority::Normal);
    assert_eq!(payload.options.delay_ms, 0);
    assert_eq!(payload.options.expiration_ms, 0);

    let result = publish.await.unwrap();
    assert_eq!(result.unwrap(), "msg-1", "ack matching is case-insensitive");
    assert_eq!(client.metrics().publish.acked, 1);
}

#[tokio::test]
async fn test_publish_forwards_caller_options() {
    let (client, mut events, mut broker) = start_client(test_config());
    let mut session = connect_ready(&client, &mut events, &mut broker).await;
    let options = PublishOptions::default()
        .with_message_id("Order-42")
        .with_qos(MessageQos::Feedback)
        .with_priority(MessagePriority::High)
        .with_delay_ms(250)
        .with_expiration_ms(60_000);

    let publish = spawn_publish(
        &client,
        "orders.created",
        json!("payload"),
        options,
        PublishClientOptions::default(),
    );
    let payload = next_publish(&mut session).await;
    session.send(ack("order-42", None));

    assert_eq!(payload.options.message_id, "order-42");
    assert_eq!(payload.options.qos, MessageQos::Feedback);
    assert_eq!(payload.options.priority, MessagePriority::High);
    assert_eq!(payload.options.delay_ms, 250);
    assert_eq!(payload.options.expiration_ms, 60_000);
    assert_eq!(publish.await.unwrap().unwrap(), "order-42");
}

#[tokio::test]
async fn test_publish_wire_format() {
    let (client, mut events, mut broker) = start_client(test_config());
    let mut session = connect_ready(&client, &mut events, &mut broker).await;

    let publish = spawn_publish(
        &client,
        "a.b",
        json!(null),
        PublishOptions::default().with_qos(MessageQos::Instant),
        PublishClientOptions::default(),
    );
    let raw = session.next_raw().await.unwrap();
    session.send(ack("msg-1", None));

    assert_eq!(raw["publish"]["topic"], "a.b");
    assert_eq!(raw["publish"]["options"]["messageId"], "msg-1");
    assert_eq!(raw["publish"]["options"]["qos"], "instant");
    assert_eq!(raw["publish"]["options"]["priority"], "normal");
    assert!(publish.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_publish_rejected_by_broker() {
    let (client, mut events, mut broker) = start_client(test_config());
    let mut session = connect_ready(&client, &mut events, &mut broker).await;

    let publish = spawn_publish(
        &client,
        "a.b",
        json!({}),
        PublishOptions::default(),
        PublishClientOptions::default(),
    );
    let payload = next_publish(&mut session).await;
    session.send(ack(&payload.options.message_id, Some("topic is closed")));

    match publish.await.unwrap() {
        Err(ClientError::PublishRejected { message_id, reason }) => {
            assert_eq!(message_id, "msg-1");
            assert_eq!(reason, "topic is closed");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(client.metrics().publish.rejected, 1);
}

#[tokio::test]
async fn test_publish_times_out_and_late_ack_is_ignored() {
    // Arrange
    let (client, mut events, mut broker) = start_client(test_config());
    let mut session = connect_ready(&client, &mut events, &mut broker).await;

    // Act
    let publish = spawn_publish(
        &client,
        "a.b",
        json!({}),
        PublishOptions::default(),
        PublishClientOptions {
            timeout: Some(Duration::from_millis(50)),
        },
    );
    let first = next_publish(&mut session).await;
    let result = publish.await.unwrap();
    session.send(ack(&first.options.message_id, None));

    // Assert
    match result {
        Err(ClientError::PublishTimeout {
            message_id,
            timeout_ms,
        }) => {
            assert_eq!(message_id, "msg-1");
            assert_eq!(timeout_ms, 50);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(client.metrics().publish.timed_out, 1);

    // The session keeps working after the stray acknowledgment
    let second = spawn_publish(
        &client,
        "a.b",
        json!({}),
        PublishOptions::default(),
        PublishClientOptions::default(),
    );
    let payload = next_publish(&mut session).await;
    session.send(ack(&payload.options.message_id, None));
    assert_eq!(second.await.unwrap().unwrap(), "msg-2");
    assert!(client.is_ready());
}

#[tokio::test]
async fn test_acks_resolve_concurrent_publishes_out_of_order() {
    let (client, mut events, mut broker) = start_client(test_config());
    let mut session = connect_ready(&client, &mut events, &mut broker).await;

    let first = spawn_publish(
        &client,
        "a.one",
        json!(1),
        PublishOptions::default().with_message_id("first"),
        PublishClientOptions::default(),
    );
    next_publish(&mut session).await;
    let second = spawn_publish(
        &client,
        "a.two",
        json!(2),
        PublishOptions::default().with_message_id("second"),
        PublishClientOptions::default(),
    );
    next_publish(&mut session).await;

    session.send(ack("second", Some("full")));
    session.send(ack("first", None));

    assert_eq!(first.await.unwrap().unwrap(), "first");
    assert!(matches!(
        second.await.unwrap(),
        Err(ClientError::PublishRejected { .. })
    ));
}

#[tokio::test]
async fn test_unmatched_ack_is_ignored() {
    let (client, mut events, mut broker) = start_client(test_config());
    let mut session = connect_ready(&client, &mut events, &mut broker).await;

    session.send(ack("never-sent", None));
    let publish = spawn_publish(
        &client,
        "a.b",
        json!({}),
        PublishOptions::default(),
        PublishClientOptions::default(),
    );
    let payload = next_publish(&mut session).await;
    session.send(ack(&payload.options.message_id, None));

    assert_eq!(publish.await.unwrap().unwrap(), "msg-1");
    assert!(events.try_recv().is_err(), "stray acks raise no events");
    assert!(client.is_ready());
}

#[tokio::test]
async fn test_publish_before_connect_fails() {
    let (client, _events, _broker) = start_client(test_config());

    let result = client.publish("a.b", json!({})).await;

    assert!(matches!(result, Err(ClientError::NotConnected)));
}

#[tokio::test]
async fn test_publish_before_login_completes_fails() {
    let (client, _events, mut broker) = start_client(test_config());
    client.connect().unwrap();
    let _session = broker.accept().await.unwrap();
    assert!(client.wait_for_state(SessionState::Connected, WAIT).await);

    let result = client.publish("a.b", json!({})).await;

    assert!(matches!(result, Err(ClientError::NotReady)));
}

#[tokio::test]
async fn test_invalid_publish_requests_are_rejected_locally() {
    let (client, mut events, mut broker) = start_client(test_config());
    let mut session = connect_ready(&client, &mut events, &mut broker).await;

    let bad_topic = client.publish("log event", json!({})).await;
    let bad_pattern_topic = client.publish("log.*", json!({})).await;
    let bad_id = client
        .publish_with(
            "a.b",
            json!({}),
            &PublishOptions::default().with_message_id("has space"),
            PublishClientOptions::default(),
        )
        .await;
    let bad_delay = client
        .publish_with(
            "a.b",
            json!({}),
            &PublishOptions::default().with_delay_ms(-1),
            PublishClientOptions::default(),
        )
        .await;
    let bad_expiration = client
        .publish_with(
            "a.b",
            json!({}),
            &PublishOptions::default().with_expiration_ms(-5),
            PublishClientOptions::default(),
        )
        .await;

    assert!(matches!(
        bad_topic,
        Err(ClientError::Validation(ValidationError::InvalidTopic(_)))
    ));
    assert!(matches!(
        bad_pattern_topic,
        Err(ClientError::Validation(ValidationError::InvalidTopic(_)))
    ));
    assert!(matches!(
        bad_id,
        Err(ClientError::Validation(ValidationError::InvalidMessageId(_)))
    ));
    assert!(matches!(
        bad_delay,
        Err(ClientError::Validation(ValidationError::NegativeDelay(-1)))
    ));
    assert!(matches!(
        bad_expiration,
        Err(ClientError::Validation(ValidationError::NegativeExpiration(-5)))
    ));
    assert!(
        session
            .next_message_within(Duration::from_millis(100))
            .await
            .is_none(),
        "nothing is sent for rejected requests"
    );
}

#[tokio::test]
async fn test_publish_after_close_fails() {
    let (client, mut events, mut broker) = start_client(test_config());
    let _session = connect_ready(&client, &mut events, &mut broker).await;

    client.close().await;
    let result = client.publish("a.b", json!({})).await;

    assert!(matches!(result, Err(ClientError::NotConnected)));
}
