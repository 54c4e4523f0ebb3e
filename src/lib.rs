//! EngineMQ client
//!
//! Client-side protocol engine for the EngineMQ topic publish/subscribe
//! broker.
//!
//! # Overview
//!
//! - Connection management with jittered automatic reconnection
//! - Login handshake with protocol version negotiation
//! - Heartbeat liveness detection
//! - Subscription registry, resent in full after every login
//! - Publish with per-message acknowledgment and timeout
//! - Delivery acknowledgment with progress reporting
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use enginemq_client::{ClientConfig, ClientEvent, EngineClient};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), enginemq_client::ClientError> {
//! let mut config = ClientConfig::default();
//! config.client.id = "worker-1".to_string();
//!
//! let (client, mut events) = EngineClient::new(config)?;
//! client.subscribe(["log.event.*"])?;
//! client.connect()?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ClientEvent::Ready { .. } => {
//!             let id = client.publish("log.event.started", json!({"ok": true})).await?;
//!             println!("published {id}");
//!         }
//!         ClientEvent::Message(mut delivery) => {
//!             delivery.ack.resolve(json!({"handled": true}));
//!         }
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod session;
pub mod testing;
pub mod transport;

pub use config::{ClientConfig, ConfigError};
pub use error::{ClientError, ClientResult};
pub use protocol::{MessagePriority, MessageQos, ValidationError};
pub use session::{
    ClientBuilder, ClientEvent, Delivery, DeliveryAck, EngineClient, ErrorKind, EventReceiver,
    PublishClientOptions, PublishOptions, SessionState, SessionStatus,
};
