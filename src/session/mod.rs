//! Client session engine
//!
//! Pure protocol pieces (state machine, handshake evaluation, heartbeat
//! timing, reconnect policy, subscription set, publish correlation, delivery
//! acknowledgment) live in their own modules. `driver` wires them to a
//! transport inside a single task and `client` is the public handle.

pub mod client;
pub mod delivery;
mod driver;
pub mod events;
pub mod handshake;
pub mod heartbeat;
pub mod publish;
pub mod reconnect;
pub mod state;
pub mod subscriptions;

pub use client::{ClientBuilder, EngineClient, EventReceiver};
pub use delivery::{Delivery, DeliveryAck};
pub use events::{ClientEvent, ErrorKind};
pub use handshake::{HandshakeOutcome, CLIENT_VERSION};
pub use heartbeat::{HeartbeatAction, HeartbeatMonitor};
pub use publish::{AckOutcome, PublishClientOptions, PublishCorrelator, PublishOptions};
pub use reconnect::{ReconnectPolicy, ReconnectionDecision};
pub use state::{SessionState, SessionStatus};
pub use subscriptions::SubscriptionRegistry;
