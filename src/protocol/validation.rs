//! Inbound payload validation keyed by command name
//!
//! The default [`SchemaValidator`] derives a JSON Schema for every broker
//! payload type with `schemars` and compiles it once with `jsonschema`.

use super::messages::{
    BrokerCommand, DeliveryPayload, DeliveryReportPayload, HeartbeatPayload, LoginAckPayload,
    PublishAckPayload, SubscribeAckPayload,
};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Checks an inbound payload before it is decoded
pub trait PayloadValidator: Send + Sync {
    /// Return a human-readable description of every violation, or `Ok(())`
    fn validate(&self, command: BrokerCommand, payload: &Value) -> Result<(), String>;
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Failed to generate schema for '{command}': {details}")]
    Generation {
        command: BrokerCommand,
        details: String,
    },
    #[error("Failed to compile schema for '{command}': {details}")]
    Compilation {
        command: BrokerCommand,
        details: String,
    },
}

/// Schema-backed validator covering every [`BrokerCommand`]
pub struct SchemaValidator {
    validators: HashMap<BrokerCommand, jsonschema::Validator>,
}

impl SchemaValidator {
    pub fn new() -> Result<Self, SchemaError> {
        let mut validators = HashMap::new();
        for command in BrokerCommand::ALL {
            let schema = Self::schema_for(command)?;
            let validator =
                jsonschema::validator_for(&schema).map_err(|e| SchemaError::Compilation {
                    command,
                    details: e.to_string(),
                })?;
            validators.insert(command, validator);
        }
        Ok(Self { validators })
    }

    /// JSON Schema describing the payload of an inbound command
    pub fn schema_for(command: BrokerCommand) -> Result<Value, SchemaError> {
        let schema = match command {
            BrokerCommand::LoginAck => schemars::schema_for!(LoginAckPayload),
            BrokerCommand::Heartbeat => schemars::schema_for!(HeartbeatPayload),
            BrokerCommand::SubscribeAck => schemars::schema_for!(SubscribeAckPayload),
            BrokerCommand::PublishAck => schemars::schema_for!(PublishAckPayload),
            BrokerCommand::Delivery => schemars::schema_for!(DeliveryPayload),
            BrokerCommand::DeliveryReport => schemars::schema_for!(DeliveryReportPayload),
        };
        serde_json::to_value(schema).map_err(|e| SchemaError::Generation {
            command,
            details: e.to_string(),
        })
    }
}

impl PayloadValidator for SchemaValidator {
    fn validate(&self, command: BrokerCommand, payload: &Value) -> Result<(), String> {
        let Some(validator) = self.validators.get(&command) else {
            return Err(format!("No schema registered for '{command}'"));
        };
        validator.validate(payload).map_err(|errors| {
            let error_messages: Vec<String> = errors
                .map(|e| format!("At '{}': {}", e.instance_path, e))
                .collect();
            error_messages.join("; ")
        })
    }
}

impl std::fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("commands", &self.validators.len())
            .finish()
    }
}
