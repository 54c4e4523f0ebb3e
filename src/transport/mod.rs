//! Message channel abstraction
//!
//! The session engine only needs to send and receive whole decoded messages
//! over one ordered stream. [`Connector`] opens such a stream and
//! [`MessageChannel`] carries it; the default implementation in [`tcp`]
//! frames JSON objects with a length prefix.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

pub mod tcp;

pub use tcp::{TcpChannel, TcpConnector};

/// One established, ordered, bidirectional message stream
#[async_trait]
pub trait MessageChannel: Send {
    /// Send one wire object
    async fn send(&mut self, message: Value) -> Result<(), TransportError>;

    /// Receive the next wire object. `Ok(None)` means the peer closed the stream.
    async fn recv(&mut self) -> Result<Option<Value>, TransportError>;

    /// Gracefully end the stream
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Configure transport-level keep-alive probing
    fn set_keep_alive(&self, interval: Duration) -> Result<(), TransportError>;
}

/// Opens message channels to a broker
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, host: &str, port: u16)
        -> Result<Box<dyn MessageChannel>, TransportError>;
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Connection attempt to {addr} timed out after {timeout_ms}ms")]
    ConnectTimeout { addr: String, timeout_ms: u64 },
    #[error("Write did not complete within {timeout_ms}ms")]
    WriteTimeout { timeout_ms: u64 },
    #[error("Connection refused: {0}")]
    Refused(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed frame: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Channel closed")]
    Closed,
}

impl TransportError {
    /// Whether the stream is unusable after this error.
    /// Malformed frames are dropped without ending the session.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TransportError::Decode(_))
    }
}
