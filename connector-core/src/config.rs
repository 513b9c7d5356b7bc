//! Configuration surface consumed by the relay engine.
//!
//! Loaded from TOML:
//!
//! ```toml
//! max_attempts = 3
//! send_timeout_ms = 5000
//!
//! [backoff]
//! base_ms = 100
//! max_ms = 30000
//! jitter = 0.2
//!
//! [retry]
//! rejected = true        # override the default classification per kind
//! ```
//!
//! Every field has a sensible default, so an empty document is a valid
//! configuration.

use crate::error::FailureKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Configuration load/validation faults.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse relay configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid relay configuration: {0}")]
    Invalid(String),
}

/// Exponential backoff policy: `base * 2^(attempt-1)` capped at `max`, with
/// a symmetric jitter fraction applied by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_ms: u64,
    pub max_ms: u64,
    /// Jitter fraction in `[0, 1]`; the delay is scaled by a random factor
    /// in `[1 - jitter, 1 + jitter]`.
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: 100,
            max_ms: 30_000,
            jitter: 0.2,
        }
    }
}

impl BackoffConfig {
    /// Deterministic (pre-jitter) delay for the given 1-based attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let scaled = self.base_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(scaled.min(self.max_ms))
    }
}

/// Per-cause retriable/non-retriable classification table.
///
/// Unlisted kinds fall back to the defaults: timeouts, connection faults,
/// journal unavailability, and unclassified faults retry; malformed,
/// rejected, and serialization causes do not.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetryClassification {
    overrides: HashMap<FailureKind, bool>,
}

impl RetryClassification {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the classification of one failure kind.
    pub fn set(&mut self, kind: FailureKind, retriable: bool) -> &mut Self {
        self.overrides.insert(kind, retriable);
        self
    }

    pub fn is_retriable(&self, kind: FailureKind) -> bool {
        if let Some(&retriable) = self.overrides.get(&kind) {
            return retriable;
        }
        match kind {
            FailureKind::Timeout
            | FailureKind::Connection
            | FailureKind::JournalUnavailable
            | FailureKind::Other => true,
            FailureKind::Malformed | FailureKind::Rejected | FailureKind::Serialization => false,
        }
    }
}

/// Top-level relay engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Maximum relay attempts per idempotency key, including the first.
    pub max_attempts: u32,
    /// Timeout applied to each outbound send.
    pub send_timeout_ms: u64,
    pub backoff: BackoffConfig,
    pub retry: RetryClassification,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            send_timeout_ms: 5_000,
            backoff: BackoffConfig::default(),
            retry: RetryClassification::default(),
        }
    }
}

impl RelayConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.send_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "send_timeout_ms must be positive".to_string(),
            ));
        }
        if self.backoff.base_ms > self.backoff.max_ms {
            return Err(ConfigError::Invalid(format!(
                "backoff base_ms ({}) exceeds max_ms ({})",
                self.backoff.base_ms, self.backoff.max_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.backoff.jitter) {
            return Err(ConfigError::Invalid(format!(
                "backoff jitter ({}) must be within [0, 1]",
                self.backoff.jitter
            )));
        }
        Ok(())
    }
}
