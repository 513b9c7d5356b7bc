//! Idempotency key derivation and correlation id helpers.
//!
//! The key uniquely identifies one logical relay attempt-set; the journal
//! enforces uniqueness on it, which is what makes redelivery from an
//! at-least-once upstream transport safe.

use crate::message::Message;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::collections::HashMap;
use std::fmt;

/// Metadata header carrying a caller-assigned correlation id.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Deterministic identifier deduplicating relay attempts for one logical
/// message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Derive the key for a message: `source:id`.
    ///
    /// Construction validates both parts non-empty, so the pair is always
    /// usable; receivers whose transport carries no native identifier mint
    /// one first via [`IdempotencyKey::from_content`] or
    /// [`correlation_id_from_metadata`].
    pub fn derive(message: &Message) -> Self {
        Self(format!("{}:{}", message.source(), message.id()))
    }

    /// Content-hash key for transports without a native message identifier.
    ///
    /// Hashes payload plus metadata with the metadata keys sorted, so the
    /// result is independent of map iteration order.
    pub fn from_content(
        source: &str,
        payload: &[u8],
        metadata: &HashMap<String, String>,
    ) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(payload);
        let mut keys: Vec<&String> = metadata.keys().collect();
        keys.sort();
        for key in keys {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            if let Some(value) = metadata.get(key) {
                hasher.update(value.as_bytes());
            }
            hasher.update(b";");
        }
        Self(format!("{}:{}", source, hex::encode(hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for IdempotencyKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Correlation id from the `x-correlation-id` header, or a fresh UUID when
/// absent or blank.
pub fn correlation_id_from_metadata(metadata: &HashMap<String, String>) -> String {
    metadata
        .get(CORRELATION_ID_HEADER)
        .filter(|id| !id.trim().is_empty())
        .cloned()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}
