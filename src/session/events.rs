//! Lifecycle and data events surfaced to the application

use super::delivery::Delivery;
use crate::error::ClientError;
use crate::protocol::DeliveryReportPayload;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Category of an asynchronously reported error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Login,
    VersionIncompatible,
    Heartbeat,
    Subscribe,
    Transport,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Login => "LOGIN",
            ErrorKind::VersionIncompatible => "VERSION_INCOMPATIBLE",
            ErrorKind::Heartbeat => "HEARTBEAT",
            ErrorKind::Subscribe => "SUBSCRIBE",
            ErrorKind::Transport => "TRANSPORT",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub enum ClientEvent {
    /// Transport connected. 0 on the first connection, incrementing after.
    Connected { reconnect_count: u32 },
    /// Login accepted; publishing is possible
    Ready {
        heartbeat_sec: Option<u64>,
        server_version: Option<String>,
    },
    Disconnected,
    Error {
        kind: ErrorKind,
        message: String,
        data: Option<Value>,
    },
    Message(Delivery),
    DeliveryReport(DeliveryReportPayload),
}

impl ClientEvent {
    /// Error event for a client error that has an event category
    pub(crate) fn from_error(error: &ClientError, data: Option<Value>) -> Option<Self> {
        error.kind().map(|kind| ClientEvent::Error {
            kind,
            message: error.to_string(),
            data,
        })
    }
}
