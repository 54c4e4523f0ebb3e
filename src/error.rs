//! Error types for the EngineMQ client
//!
//! [`ClientError`] is what callers of the public API see. Errors that are
//! also reported asynchronously on the event stream map to an [`ErrorKind`].

use crate::config::ConfigError;
use crate::protocol::{SchemaError, SubscribeFailure, ValidationError};
use crate::session::events::ErrorKind;
use crate::transport::TransportError;
use thiserror::Error;

/// Main error type for client operations
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Client is not connected")]
    NotConnected,

    #[error("Client is connected but the login handshake has not completed")]
    NotReady,

    #[error("No acknowledgment for message '{message_id}' within {timeout_ms}ms")]
    PublishTimeout { message_id: String, timeout_ms: u64 },

    #[error("Broker rejected message '{message_id}': {reason}")]
    PublishRejected { message_id: String, reason: String },

    #[error("Publish of message '{message_id}' was abandoned before an acknowledgment arrived")]
    PublishAbandoned { message_id: String },

    #[error("Broker version {server_version} is incompatible with client version {client_version}")]
    VersionIncompatible {
        server_version: String,
        client_version: String,
    },

    #[error("Login rejected: {message}")]
    Login { message: String },

    #[error("No traffic from broker within {interval_secs}s heartbeat interval")]
    HeartbeatLost { interval_secs: u64 },

    #[error("Broker rejected {} subscription pattern(s)", .errors.len())]
    SubscribeRejected { errors: Vec<SubscribeFailure> },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Client session has shut down")]
    SessionClosed,
}

impl ClientError {
    pub fn publish_timeout<S: Into<String>>(message_id: S, timeout_ms: u64) -> Self {
        Self::PublishTimeout {
            message_id: message_id.into(),
            timeout_ms,
        }
    }

    pub fn publish_rejected<S: Into<String>, R: Into<String>>(message_id: S, reason: R) -> Self {
        Self::PublishRejected {
            message_id: message_id.into(),
            reason: reason.into(),
        }
    }

    pub fn publish_abandoned<S: Into<String>>(message_id: S) -> Self {
        Self::PublishAbandoned {
            message_id: message_id.into(),
        }
    }

    pub fn login<S: Into<String>>(message: S) -> Self {
        Self::Login {
            message: message.into(),
        }
    }

    /// Event category for errors that are also surfaced on the event stream
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ClientError::Login { .. } => Some(ErrorKind::Login),
            ClientError::VersionIncompatible { .. } => Some(ErrorKind::VersionIncompatible),
            ClientError::HeartbeatLost { .. } => Some(ErrorKind::Heartbeat),
            ClientError::SubscribeRejected { .. } => Some(ErrorKind::Subscribe),
            ClientError::Transport(_) => Some(ErrorKind::Transport),
            _ => None,
        }
    }

    /// Whether this error stops automatic reconnection
    pub fn disables_reconnect(&self) -> bool {
        matches!(
            self,
            ClientError::Login { .. } | ClientError::VersionIncompatible { .. }
        )
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
