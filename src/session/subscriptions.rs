//! Desired subscription set
//!
//! Insertion-ordered and duplicate-free. The registry holds no I/O; the
//! session sends the full set to the broker after login and after every
//! change made while ready.

use crate::protocol::{validate_pattern, ValidationError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionRegistry {
    patterns: Vec<String>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate every pattern first; nothing is inserted if any is invalid.
    /// Returns the number of newly added patterns.
    pub fn subscribe<I, S>(&mut self, patterns: I) -> Result<usize, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let candidates = Self::validated(patterns)?;
        let before = self.patterns.len();
        for pattern in candidates {
            if !self.patterns.contains(&pattern) {
                self.patterns.push(pattern);
            }
        }
        Ok(self.patterns.len() - before)
    }

    /// Check patterns without touching the registry
    pub fn validated<I, S>(patterns: I) -> Result<Vec<String>, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        patterns
            .into_iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                validate_pattern(pattern).map(|()| pattern.to_string())
            })
            .collect()
    }

    /// Remove patterns if present. Returns the number removed.
    pub fn unsubscribe<I, S>(&mut self, patterns: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let before = self.patterns.len();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            self.patterns.retain(|existing| existing != pattern);
        }
        before - self.patterns.len()
    }

    pub fn clear(&mut self) {
        self.patterns.clear();
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn contains(&self, pattern: &str) -> bool {
        self.patterns.iter().any(|p| p == pattern)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
