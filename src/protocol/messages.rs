//! Wire message types for the EngineMQ protocol
//!
//! Every decoded unit on the wire is a single-key object mapping a command
//! name to its payload, e.g. `{"publishAck": {"messageId": "abc"}}`. Outbound
//! commands are modelled by [`ClientMessage`], inbound ones by
//! [`BrokerMessage`]; both use serde's externally tagged representation so
//! the enum variant name *is* the command key.
//!
//! # Examples
//! ```
//! use enginemq_client::protocol::{ClientMessage, SubscribePayload};
//! use serde_json::json;
//!
//! let msg = ClientMessage::Subscribe(SubscribePayload {
//!     subscriptions: vec!["log.event.*".to_string()],
//! });
//! assert_eq!(
//!     serde_json::to_value(&msg).unwrap(),
//!     json!({"subscribe": {"subscriptions": ["log.event.*"]}})
//! );
//! ```

use super::validation::PayloadValidator;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Delivery guarantee requested for a published message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MessageQos {
    /// Fire and forget, no delivery tracking
    Instant,
    /// Broker waits for a terminal delivery acknowledgment
    #[default]
    Normal,
    /// Progress is reported back to the publisher
    Feedback,
}

/// Scheduling priority of a published message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MessagePriority {
    Low,
    #[default]
    Normal,
    High,
}

// ========== Client -> Broker ==========

/// Outbound commands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Login(LoginPayload),
    Heartbeat(HeartbeatPayload),
    Subscribe(SubscribePayload),
    Publish(PublishPayload),
    DeliveryAck(DeliveryAckPayload),
}

impl ClientMessage {
    /// Wire command name
    pub fn command(&self) -> &'static str {
        match self {
            ClientMessage::Login(_) => "login",
            ClientMessage::Heartbeat(_) => "heartbeat",
            ClientMessage::Subscribe(_) => "subscribe",
            ClientMessage::Publish(_) => "publish",
            ClientMessage::DeliveryAck(_) => "deliveryAck",
        }
    }

    /// Encode into the single-key wire object
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginPayload {
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    pub max_workers: u32,
    pub version: String,
}

/// Empty body shared by both heartbeat directions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct HeartbeatPayload {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribePayload {
    pub subscriptions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishPayload {
    pub topic: String,
    pub message: Value,
    pub options: PublishWireOptions,
}

/// Normalized publish options as sent on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishWireOptions {
    pub message_id: String,
    pub qos: MessageQos,
    pub priority: MessagePriority,
    pub delay_ms: u64,
    pub expiration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAckPayload {
    pub message_id: String,
    pub percent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolve_reason: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_retry_delay_ms: Option<u64>,
}

// ========== Broker -> Client ==========

/// Inbound commands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BrokerMessage {
    LoginAck(LoginAckPayload),
    Heartbeat(HeartbeatPayload),
    SubscribeAck(SubscribeAckPayload),
    PublishAck(PublishAckPayload),
    Delivery(DeliveryPayload),
    #[serde(alias = "deliveryreport")]
    DeliveryReport(DeliveryReportPayload),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginAckPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_sec: Option<u64>,
    /// Broker protocol version, compared against the client's major version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SubscribeAckPayload {
    #[serde(default)]
    pub errors: Vec<SubscribeFailure>,
}

/// One pattern the broker refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeFailure {
    pub pattern: String,
    pub error_message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublishAckPayload {
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DeliveryPayload {
    pub topic: String,
    pub message: Value,
    pub options: DeliveryOptions,
}

/// Delivery metadata. Fields other than the id are passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryOptions {
    pub message_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReportPayload {
    pub message_id: String,
    #[serde(flatten)]
    pub status: Map<String, Value>,
}

/// Inbound command names, used to key payload validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrokerCommand {
    LoginAck,
    Heartbeat,
    SubscribeAck,
    PublishAck,
    Delivery,
    DeliveryReport,
}

impl BrokerCommand {
    pub const ALL: [BrokerCommand; 6] = [
        BrokerCommand::LoginAck,
        BrokerCommand::Heartbeat,
        BrokerCommand::SubscribeAck,
        BrokerCommand::PublishAck,
        BrokerCommand::Delivery,
        BrokerCommand::DeliveryReport,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BrokerCommand::LoginAck => "loginAck",
            BrokerCommand::Heartbeat => "heartbeat",
            BrokerCommand::SubscribeAck => "subscribeAck",
            BrokerCommand::PublishAck => "publishAck",
            BrokerCommand::Delivery => "delivery",
            BrokerCommand::DeliveryReport => "deliveryReport",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "loginAck" => Some(BrokerCommand::LoginAck),
            "heartbeat" => Some(BrokerCommand::Heartbeat),
            "subscribeAck" => Some(BrokerCommand::SubscribeAck),
            "publishAck" => Some(BrokerCommand::PublishAck),
            "delivery" => Some(BrokerCommand::Delivery),
            "deliveryReport" | "deliveryreport" => Some(BrokerCommand::DeliveryReport),
            _ => None,
        }
    }
}

impl fmt::Display for BrokerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reasons an inbound frame is discarded
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Frame is not a JSON object")]
    NotAnObject,
    #[error("Frame must carry exactly one command, found {0}")]
    CommandCount(usize),
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("Payload for '{command}' failed schema validation: {details}")]
    SchemaViolation {
        command: BrokerCommand,
        details: String,
    },
    #[error("Payload for '{command}' could not be decoded: {source}")]
    Payload {
        command: BrokerCommand,
        #[source]
        source: serde_json::Error,
    },
}

/// Split a wire object into its command name and payload (pure function)
pub fn split_envelope(frame: Value) -> Result<(String, Value), DecodeError> {
    let Value::Object(map) = frame else {
        return Err(DecodeError::NotAnObject);
    };
    if map.len() != 1 {
        return Err(DecodeError::CommandCount(map.len()));
    }
    map.into_iter()
        .next()
        .ok_or(DecodeError::CommandCount(0))
}

fn payload<T: DeserializeOwned>(command: BrokerCommand, value: Value) -> Result<T, DecodeError> {
    serde_json::from_value(value).map_err(|source| DecodeError::Payload { command, source })
}

impl BrokerMessage {
    pub fn command(&self) -> BrokerCommand {
        match self {
            BrokerMessage::LoginAck(_) => BrokerCommand::LoginAck,
            BrokerMessage::Heartbeat(_) => BrokerCommand::Heartbeat,
            BrokerMessage::SubscribeAck(_) => BrokerCommand::SubscribeAck,
            BrokerMessage::PublishAck(_) => BrokerCommand::PublishAck,
            BrokerMessage::Delivery(_) => BrokerCommand::Delivery,
            BrokerMessage::DeliveryReport(_) => BrokerCommand::DeliveryReport,
        }
    }

    /// Decode a validated payload for a known command
    pub fn from_parts(command: BrokerCommand, value: Value) -> Result<Self, DecodeError> {
        Ok(match command {
            BrokerCommand::LoginAck => BrokerMessage::LoginAck(payload(command, value)?),
            BrokerCommand::Heartbeat => BrokerMessage::Heartbeat(payload(command, value)?),
            BrokerCommand::SubscribeAck => BrokerMessage::SubscribeAck(payload(command, value)?),
            BrokerCommand::PublishAck => BrokerMessage::PublishAck(payload(command, value)?),
            BrokerCommand::Delivery => BrokerMessage::Delivery(payload(command, value)?),
            BrokerCommand::DeliveryReport => {
                BrokerMessage::DeliveryReport(payload(command, value)?)
            }
        })
    }

    /// Full inbound pipeline: envelope shape, command lookup, schema check, decode
    pub fn decode(frame: Value, validator: &dyn PayloadValidator) -> Result<Self, DecodeError> {
        let (name, value) = split_envelope(frame)?;
        let command =
            BrokerCommand::from_name(&name).ok_or(DecodeError::UnknownCommand(name))?;
        validator
            .validate(command, &value)
            .map_err(|details| DecodeError::SchemaViolation { command, details })?;
        Self::from_parts(command, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::validation::SchemaValidator;
    use serde_json::json;

    fn validator() -> SchemaValidator {
        SchemaValidator::new().expect("schemas compile")
    }

    #[test]
    fn test_login_serializes_without_missing_token() {
        let msg = ClientMessage::Login(LoginPayload {
            client_id: "worker-1".to_string(),
            auth_token: None,
            max_workers: 1,
            version: "0.1.0".to_string(),
        });

        let value = msg.to_value().unwrap();

        assert_eq!(
            value,
            json!({"login": {"clientId": "worker-1", "maxWorkers": 1, "version": "0.1.0"}})
        );
    }

    #[test]
    fn test_heartbeat_is_empty_object() {
        let value = ClientMessage::Heartbeat(HeartbeatPayload {}).to_value().unwrap();
        assert_eq!(value, json!({"heartbeat": {}}));
    }

    #[test]
    fn test_publish_wire_shape() {
        let msg = ClientMessage::Publish(PublishPayload {
            topic: "log.event.error".to_string(),
            message: json!({"line": 1}),
            options: PublishWireOptions {
                message_id: "abc".to_string(),
                qos: MessageQos::Feedback,
                priority: MessagePriority::High,
                delay_ms: 0,
                expiration_ms: 1000,
            },
        });

        let value = msg.to_value().unwrap();

        assert_eq!(
            value["publish"]["options"],
            json!({
                "messageId": "abc",
                "qos": "feedback",
                "priority": "high",
                "delayMs": 0,
                "expirationMs": 1000
            })
        );
    }

    #[test]
    fn test_delivery_ack_omits_absent_reasons() {
        let msg = ClientMessage::DeliveryAck(DeliveryAckPayload {
            message_id: "m1".to_string(),
            percent: 40,
            resolve_reason: None,
            reject_reason: None,
            reject_retry_delay_ms: None,
        });

        assert_eq!(
            msg.to_value().unwrap(),
            json!({"deliveryAck": {"messageId": "m1", "percent": 40}})
        );
    }

    #[test]
    fn test_decode_publish_ack() {
        let frame = json!({"publishAck": {"messageId": "abc", "errorMessage": "quota"}});

        let msg = BrokerMessage::decode(frame, &validator()).unwrap();

        assert_eq!(
            msg,
            BrokerMessage::PublishAck(PublishAckPayload {
                message_id: "abc".to_string(),
                error_message: Some("quota".to_string()),
            })
        );
    }

    #[test]
    fn test_decode_delivery_keeps_extra_options() {
        let frame = json!({"delivery": {
            "topic": "log.event.error",
            "message": [1, 2, 3],
            "options": {"messageId": "m1", "qos": "feedback", "retryCount": 2}
        }});

        let BrokerMessage::Delivery(delivery) = BrokerMessage::decode(frame, &validator()).unwrap()
        else {
            panic!("expected delivery");
        };

        assert_eq!(delivery.options.message_id, "m1");
        assert_eq!(delivery.options.extra.get("retryCount"), Some(&json!(2)));
        assert!(!delivery.options.extra.contains_key("messageId"));
    }

    #[test]
    fn test_decode_accepts_lowercase_delivery_report_alias() {
        let frame = json!({"deliveryreport": {"messageId": "m1", "percent": 50}});

        let msg = BrokerMessage::decode(frame, &validator()).unwrap();

        assert_eq!(msg.command(), BrokerCommand::DeliveryReport);
    }

    #[test]
    fn test_decode_rejects_bad_envelopes() {
        let v = validator();

        assert!(matches!(
            BrokerMessage::decode(json!([1]), &v),
            Err(DecodeError::NotAnObject)
        ));
        assert!(matches!(
            BrokerMessage::decode(json!({}), &v),
            Err(DecodeError::CommandCount(0))
        ));
        assert!(matches!(
            BrokerMessage::decode(json!({"heartbeat": {}, "loginAck": {}}), &v),
            Err(DecodeError::CommandCount(2))
        ));
        assert!(matches!(
            BrokerMessage::decode(json!({"shutdown": {}}), &v),
            Err(DecodeError::UnknownCommand(name)) if name == "shutdown"
        ));
    }

    #[test]
    fn test_decode_rejects_schema_violations() {
        let result = BrokerMessage::decode(json!({"publishAck": {"errorMessage": "x"}}), &validator());

        assert!(
            matches!(result, Err(DecodeError::SchemaViolation { command: BrokerCommand::PublishAck, .. })),
            "publishAck without messageId must be rejected, got {result:?}"
        );
    }

    #[test]
    fn test_command_names_round_trip() {
        for command in BrokerCommand::ALL {
            assert_eq!(BrokerCommand::from_name(command.as_str()), Some(command));
        }
    }
}
