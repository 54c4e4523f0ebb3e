//! TCP message channel
//!
//! Each wire object is serialized as JSON and carried in one length-prefixed
//! frame (4-byte big-endian length, as produced by
//! [`tokio_util::codec::LengthDelimitedCodec`]).

use super::{Connector, MessageChannel, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use socket2::{SockRef, TcpKeepalive};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::debug;

/// Upper bound on a single inbound frame
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Opens [`TcpChannel`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(
        &self,
        host: &str,
        port: u16,
    ) -> Result<Box<dyn MessageChannel>, TransportError> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|source| TransportError::Connect {
                addr: format!("{host}:{port}"),
                source,
            })?;
        stream.set_nodelay(true)?;
        debug!("TCP connection established to {}:{}", host, port);
        Ok(Box::new(TcpChannel::new(stream)))
    }
}

/// Length-delimited JSON frames over a TCP stream
pub struct TcpChannel {
    framed: Framed<TcpStream, LengthDelimitedCodec>,
}

impl TcpChannel {
    pub fn new(stream: TcpStream) -> Self {
        let codec = LengthDelimitedCodec::builder()
            .max_frame_length(MAX_FRAME_LENGTH)
            .new_codec();
        Self {
            framed: Framed::new(stream, codec),
        }
    }
}

#[async_trait]
impl MessageChannel for TcpChannel {
    async fn send(&mut self, message: Value) -> Result<(), TransportError> {
        let encoded = serde_json::to_vec(&message)?;
        self.framed.send(Bytes::from(encoded)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Value>, TransportError> {
        match self.framed.next().await {
            None => Ok(None),
            Some(Err(e)) => Err(TransportError::Io(e)),
            Some(Ok(frame)) => Ok(Some(serde_json::from_slice(&frame)?)),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        SinkExt::<Bytes>::close(&mut self.framed).await?;
        Ok(())
    }

    fn set_keep_alive(&self, interval: Duration) -> Result<(), TransportError> {
        let socket = SockRef::from(self.framed.get_ref());
        socket.set_tcp_keepalive(&TcpKeepalive::new().with_time(interval))?;
        Ok(())
    }
}
