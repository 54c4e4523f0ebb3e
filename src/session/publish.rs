//! Publish normalization and acknowledgment correlation
//!
//! Each outstanding publish owns a single `oneshot` completion slot keyed by
//! its lowercased message id. Whichever of {broker acknowledgment, caller
//! timeout} reaches the slot first wins; the other finds it gone.

use crate::error::{ClientError, ClientResult};
use crate::protocol::{
    normalize_message_id, normalize_topic, IdGenerator, MessagePriority, MessageQos,
    PublishAckPayload, PublishPayload, PublishWireOptions, ValidationError,
};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

/// Per-message options supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOptions {
    /// Generated when absent or empty
    pub message_id: Option<String>,
    pub qos: MessageQos,
    pub priority: MessagePriority,
    pub delay_ms: Option<i64>,
    pub expiration_ms: Option<i64>,
}

impl PublishOptions {
    pub fn with_message_id<S: Into<String>>(mut self, id: S) -> Self {
        self.message_id = Some(id.into());
        self
    }

    pub fn with_qos(mut self, qos: MessageQos) -> Self {
        self.qos = qos;
        self
    }

    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: i64) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }

    pub fn with_expiration_ms(mut self, expiration_ms: i64) -> Self {
        self.expiration_ms = Some(expiration_ms);
        self
    }
}

/// Options that only affect the local call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishClientOptions {
    /// Overrides the configured acknowledgment timeout
    pub timeout: Option<Duration>,
}

/// Validate and normalize a publish request (pure apart from id generation)
pub fn prepare_publish(
    topic: &str,
    message: Value,
    options: &PublishOptions,
    ids: &dyn IdGenerator,
) -> Result<PublishPayload, ValidationError> {
    let topic = normalize_topic(topic)?;

    let raw_id = match options.message_id.as_deref() {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => ids.generate(),
    };
    let message_id = normalize_message_id(&raw_id)?;

    let delay_ms = options.delay_ms.unwrap_or(0);
    if delay_ms < 0 {
        return Err(ValidationError::NegativeDelay(delay_ms));
    }
    let expiration_ms = options.expiration_ms.unwrap_or(0);
    if expiration_ms < 0 {
        return Err(ValidationError::NegativeExpiration(expiration_ms));
    }

    Ok(PublishPayload {
        topic,
        message,
        options: PublishWireOptions {
            message_id,
            qos: options.qos,
            priority: options.priority,
            delay_ms: delay_ms as u64,
            expiration_ms: expiration_ms as u64,
        },
    })
}

/// Completion slot handed to the correlator
pub type PublishReply = oneshot::Sender<ClientResult<String>>;

#[derive(Debug)]
struct PendingPublish {
    reply: PublishReply,
    issued_at: Instant,
}

/// How an acknowledgment retired a pending publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    Acked,
    Rejected,
    /// No pending entry: already timed out, swept, or never ours
    Unmatched,
}

#[derive(Debug)]
pub struct PublishCorrelator {
    pending: HashMap<String, PendingPublish>,
    stale_after: Duration,
    sweep_min_len: usize,
    last_sweep: Option<Instant>,
}

impl PublishCorrelator {
    pub fn new(stale_after: Duration, sweep_min_len: usize) -> Self {
        Self {
            pending: HashMap::new(),
            stale_after,
            sweep_min_len,
            last_sweep: None,
        }
    }

    /// Track a sent publish. A pending entry with the same id is displaced and
    /// its caller fails with `PublishAbandoned`.
    pub fn register(&mut self, message_id: String, reply: PublishReply, now: Instant) {
        let entry = PendingPublish {
            reply,
            issued_at: now,
        };
        if let Some(displaced) = self.pending.insert(message_id.clone(), entry) {
            debug!("Message id {} reused while pending", message_id);
            let _ = displaced
                .reply
                .send(Err(ClientError::publish_abandoned(message_id)));
        }
    }

    /// Retire the entry matching an acknowledgment
    pub fn resolve(&mut self, ack: &PublishAckPayload) -> AckOutcome {
        let message_id = ack.message_id.to_lowercase();
        let Some(entry) = self.pending.remove(&message_id) else {
            debug!("Ignoring publishAck for unknown message {}", message_id);
            return AckOutcome::Unmatched;
        };

        let (result, outcome) = match &ack.error_message {
            None => (Ok(message_id.clone()), AckOutcome::Acked),
            Some(reason) => (
                Err(ClientError::publish_rejected(message_id.clone(), reason.clone())),
                AckOutcome::Rejected,
            ),
        };
        if entry.reply.send(result).is_err() {
            // Caller already gave up; the acknowledgment lost the race
            return AckOutcome::Unmatched;
        }
        outcome
    }

    /// Drop the entry of a caller that timed out. An entry whose caller is
    /// still waiting belongs to a newer publish with the same id and is kept.
    pub fn abandon(&mut self, message_id: &str) -> bool {
        match self.pending.get(message_id) {
            Some(entry) if entry.reply.is_closed() => {
                self.pending.remove(message_id);
                true
            }
            _ => false,
        }
    }

    /// Reclaim entries whose caller has gone away. Runs at most once per half
    /// staleness window and only with at least `sweep_min_len` entries. An
    /// entry whose caller is still waiting is kept regardless of age; its
    /// own timeout retires it.
    pub fn maintain(&mut self, now: Instant) -> usize {
        if self.pending.len() < self.sweep_min_len {
            return 0;
        }
        if let Some(last) = self.last_sweep {
            if now.saturating_duration_since(last) < self.stale_after / 2 {
                return 0;
            }
        }
        self.last_sweep = Some(now);

        let before = self.pending.len();
        let stale_after = self.stale_after;
        let mut waiting_past_window = 0;
        self.pending.retain(|_, entry| {
            let waiting = !entry.reply.is_closed();
            if waiting && now.saturating_duration_since(entry.issued_at) > stale_after {
                waiting_past_window += 1;
            }
            waiting
        });
        let swept = before - self.pending.len();
        if swept > 0 {
            debug!("Swept {} orphaned pending publishes", swept);
        }
        if waiting_past_window > 0 {
            debug!(
                "{} pending publishes older than {}s still have a waiting caller",
                waiting_past_window,
                stale_after.as_secs()
            );
        }
        swept
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
