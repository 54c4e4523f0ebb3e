//! Pure login handshake logic
//!
//! The client sends `login` right after the transport connects and waits for
//! `loginAck`. An error message in the acknowledgment, or a broker version
//! whose major component differs from ours, ends the session without
//! automatic reconnection.

use crate::protocol::{LoginAckPayload, LoginPayload};
use std::time::Duration;

/// Protocol version announced at login
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build the login request. Client ids are case-insensitive and sent lowercased.
pub fn build_login(client_id: &str, auth_token: Option<&str>, max_workers: u32) -> LoginPayload {
    LoginPayload {
        client_id: client_id.to_lowercase(),
        auth_token: auth_token.map(str::to_string),
        max_workers,
        version: CLIENT_VERSION.to_string(),
    }
}

/// Result of evaluating a login acknowledgment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    Accepted {
        /// `None` when the broker disabled heartbeats (absent or 0)
        heartbeat: Option<Duration>,
        server_version: Option<String>,
    },
    Rejected {
        message: String,
    },
    Incompatible {
        server_version: String,
    },
}

/// Evaluate a login acknowledgment against the client version (pure function)
pub fn evaluate(ack: &LoginAckPayload, client_version: &str) -> HandshakeOutcome {
    if let Some(message) = &ack.error_message {
        return HandshakeOutcome::Rejected {
            message: message.clone(),
        };
    }

    if let Some(server_version) = &ack.version {
        if !versions_compatible(server_version, client_version) {
            return HandshakeOutcome::Incompatible {
                server_version: server_version.clone(),
            };
        }
    }

    HandshakeOutcome::Accepted {
        heartbeat: ack
            .heartbeat_sec
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs),
        server_version: ack.version.clone(),
    }
}

/// Major component of a semantic version string, tolerating a `v` prefix
pub fn major_version(version: &str) -> Option<u64> {
    let version = version.trim();
    let version = version.strip_prefix('v').unwrap_or(version);
    let major = version.split(['.', '-', '+']).next()?;
    major.parse().ok()
}

/// Same major version. Unparseable versions are never compatible.
pub fn versions_compatible(server_version: &str, client_version: &str) -> bool {
    match (major_version(server_version), major_version(client_version)) {
        (Some(server), Some(client)) => server == client,
        _ => false,
    }
}

/// Transport keep-alive for a negotiated heartbeat interval
pub fn keep_alive_for(heartbeat: Duration) -> Duration {
    heartbeat / 2
}
