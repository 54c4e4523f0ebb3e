//! Pure reconnection decision logic
//!
//! Every attempt waits a delay drawn uniformly from `[0, max_wait]`. The
//! window is the same for every attempt.

use super::state::SessionState;
use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_wait: Duration,
}

impl ReconnectPolicy {
    pub fn new(max_wait: Duration) -> Self {
        Self { max_wait }
    }

    /// Uniform jitter in `[0, max_wait]`
    pub fn next_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let max_nanos = self.max_wait.as_nanos().min(u64::MAX as u128) as u64;
        if max_nanos == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(rng.gen_range(0..=max_nanos))
    }

    /// Decide whether to schedule an attempt after the transport went away
    pub fn decide<R: Rng + ?Sized>(
        &self,
        enabled: bool,
        state: SessionState,
        rng: &mut R,
    ) -> ReconnectionDecision {
        if !enabled {
            return ReconnectionDecision::AbortDisabled;
        }
        if state != SessionState::Disconnected {
            return ReconnectionDecision::AbortActive;
        }
        ReconnectionDecision::Proceed {
            delay: self.next_delay(rng),
        }
    }
}

/// Decision result for reconnection attempts
#[derive(Debug, PartialEq, Eq)]
pub enum ReconnectionDecision {
    /// Schedule one attempt after `delay`
    Proceed { delay: Duration },
    /// Reconnection is switched off (closed by caller or fatal handshake error)
    AbortDisabled,
    /// A connection is already up or being established
    AbortActive,
}
