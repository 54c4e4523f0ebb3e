//! Pure session state machine
//!
//! `disconnected -> connecting -> connected -> ready -> disconnected`.
//! Transport close or a fatal protocol error returns to `disconnected` from
//! any state.

use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Ready,
}

impl SessionState {
    /// Transport is up (handshake may still be pending)
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected | SessionState::Ready)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, SessionState::Ready)
    }
}

/// Inputs that move the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    ConnectStarted,
    TransportConnected,
    HandshakeAccepted,
    TransportClosed(String),
    ConnectFailed(String),
}

/// Determine next state after a session event (pure function)
pub fn next_state(current: SessionState, event: &SessionEvent) -> SessionState {
    match (current, event) {
        (_, SessionEvent::ConnectStarted) => SessionState::Connecting,
        (_, SessionEvent::TransportConnected) => {
            info!("Transport connected, awaiting login acknowledgment");
            SessionState::Connected
        }
        (SessionState::Connected, SessionEvent::HandshakeAccepted) => {
            info!("Login accepted, session ready");
            SessionState::Ready
        }
        (state, SessionEvent::HandshakeAccepted) => {
            warn!("Ignoring handshake result in state {:?}", state);
            state
        }
        (_, SessionEvent::TransportClosed(reason)) => {
            info!("Session disconnected: {}", reason);
            SessionState::Disconnected
        }
        (_, SessionEvent::ConnectFailed(reason)) => {
            warn!("Connection attempt failed: {}", reason);
            SessionState::Disconnected
        }
    }
}

/// Read-only session snapshot shared with client handles
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    /// `None` until the first successful connect, then 0, 1, 2, ...
    pub reconnect_count: Option<u32>,
    pub reconnect_enabled: bool,
    /// Heartbeat interval negotiated at the last successful login
    pub heartbeat_sec: Option<u64>,
    pub server_version: Option<String>,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            state: SessionState::Disconnected,
            reconnect_count: None,
            reconnect_enabled: false,
            heartbeat_sec: None,
            server_version: None,
        }
    }
}
