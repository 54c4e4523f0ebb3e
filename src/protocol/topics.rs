//! Topic, pattern and message identifier grammar for the EngineMQ protocol
//!
//! Topics are `.`-separated lowercase alphanumeric segments. Subscription
//! patterns additionally allow a whole segment to be `*` (exactly one
//! segment) or `#` (zero or more segments). Message identifiers are
//! case-insensitive tokens normalized to lowercase before they go on the wire.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Maximum length of a topic or subscription pattern
pub const TOPIC_MAX_LENGTH: usize = 255;

/// Maximum length of a message identifier
pub const MESSAGE_ID_MAX_LENGTH: usize = 64;

static TOPIC_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]+(?:\.[a-z0-9]+)*$").expect("topic regex is valid")
});

static PATTERN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[a-z0-9]+|\*|#)(?:\.(?:[a-z0-9]+|\*|#))*$").expect("pattern regex is valid")
});

static MESSAGE_ID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("message id regex is valid"));

/// Synchronous validation failures raised before anything reaches the wire
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid topic '{0}': expected dot-separated lowercase alphanumeric segments")]
    InvalidTopic(String),
    #[error("Invalid subscription pattern '{0}'")]
    InvalidPattern(String),
    #[error("Topic or pattern exceeds {max} characters (got {length})")]
    TooLong { length: usize, max: usize },
    #[error("Invalid message id '{0}': expected 1-64 characters of [A-Za-z0-9_-]")]
    InvalidMessageId(String),
    #[error("delayMs must be non-negative (got {0})")]
    NegativeDelay(i64),
    #[error("expirationMs must be non-negative (got {0})")]
    NegativeExpiration(i64),
}

fn check_length(value: &str) -> Result<(), ValidationError> {
    let length = value.chars().count();
    if length > TOPIC_MAX_LENGTH {
        return Err(ValidationError::TooLong {
            length,
            max: TOPIC_MAX_LENGTH,
        });
    }
    Ok(())
}

/// Lowercase a publish topic and check it against the topic grammar
pub fn normalize_topic(topic: &str) -> Result<String, ValidationError> {
    let topic = topic.to_lowercase();
    check_length(&topic)?;
    if !TOPIC_REGEX.is_match(&topic) {
        return Err(ValidationError::InvalidTopic(topic));
    }
    Ok(topic)
}

/// Check a subscription pattern. Patterns are taken as given, not lowercased.
pub fn validate_pattern(pattern: &str) -> Result<(), ValidationError> {
    check_length(pattern)?;
    if !PATTERN_REGEX.is_match(pattern) {
        return Err(ValidationError::InvalidPattern(pattern.to_string()));
    }
    Ok(())
}

/// Check a message identifier and return its lowercase wire form
pub fn normalize_message_id(id: &str) -> Result<String, ValidationError> {
    if !MESSAGE_ID_REGEX.is_match(id) {
        return Err(ValidationError::InvalidMessageId(id.to_string()));
    }
    Ok(id.to_lowercase())
}
