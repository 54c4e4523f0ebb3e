//! Delivery acknowledgment protocol
//!
//! Every message the broker pushes to this client comes with a
//! [`DeliveryAck`]. The application reports progress through it and finishes
//! with exactly one terminal outcome; once finalized, every further call is a
//! no-op and nothing more is sent.

use crate::protocol::{ClientMessage, DeliveryAckPayload, DeliveryOptions, DeliveryPayload};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

/// Outbound queue into the session task
pub type OutboundSender = mpsc::UnboundedSender<ClientMessage>;

/// A message delivered by the broker, with its acknowledgment handle
#[derive(Debug)]
pub struct Delivery {
    pub topic: String,
    pub message: Value,
    pub options: DeliveryOptions,
    pub ack: DeliveryAck,
}

impl Delivery {
    pub(crate) fn new(payload: DeliveryPayload, outbound: OutboundSender) -> Self {
        let ack = DeliveryAck::new(payload.options.message_id.clone(), outbound);
        Self {
            topic: payload.topic,
            message: payload.message,
            options: payload.options,
            ack,
        }
    }

    pub fn message_id(&self) -> &str {
        &self.options.message_id
    }
}

/// Per-delivery acknowledgment state machine
#[derive(Debug)]
pub struct DeliveryAck {
    message_id: String,
    finalized: bool,
    last_percent: u8,
    outbound: OutboundSender,
}

impl DeliveryAck {
    pub fn new(message_id: String, outbound: OutboundSender) -> Self {
        Self {
            message_id,
            finalized: false,
            last_percent: 0,
            outbound,
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn last_percent(&self) -> u8 {
        self.last_percent
    }

    /// Equivalent to `progress(0)`
    pub fn start(&mut self) {
        self.progress(0);
    }

    /// Report progress. Values are clamped to `0..=100`; reaching 100 finalizes.
    pub fn progress(&mut self, percent: i64) {
        if self.finalized {
            return;
        }
        let percent = percent.clamp(0, 100) as u8;
        self.last_percent = percent;
        self.send(percent, None, None, None);
        if percent == 100 {
            self.finalized = true;
        }
    }

    /// Equivalent to `progress(100)`
    pub fn finish(&mut self) {
        self.progress(100);
    }

    /// Finalize successfully with a result payload
    pub fn resolve(&mut self, value: Value) {
        if self.finalized {
            return;
        }
        self.last_percent = 100;
        self.send(100, Some(value), None, None);
        self.finalized = true;
    }

    /// Finalize as failed; the broker may redeliver after `retry_delay_ms`
    pub fn reject(&mut self, reason: Value, retry_delay_ms: u64) {
        if self.finalized {
            return;
        }
        self.send(self.last_percent, None, Some(reason), Some(retry_delay_ms));
        self.finalized = true;
    }

    /// Finalize as failed with no retry hint
    pub fn reject_fatal(&mut self, reason: Value) {
        if self.finalized {
            return;
        }
        self.send(self.last_percent, None, Some(reason), None);
        self.finalized = true;
    }

    fn send(
        &self,
        percent: u8,
        resolve_reason: Option<Value>,
        reject_reason: Option<Value>,
        reject_retry_delay_ms: Option<u64>,
    ) {
        let message = ClientMessage::DeliveryAck(DeliveryAckPayload {
            message_id: self.message_id.clone(),
            percent,
            resolve_reason,
            reject_reason,
            reject_retry_delay_ms,
        });
        if self.outbound.send(message).is_err() {
            debug!(
                "Session gone, dropping deliveryAck for {}",
                self.message_id
            );
        }
    }
}
