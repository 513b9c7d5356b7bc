//! Per-attempt transformation context.

use connector_core::IdempotencyKey;
use std::collections::HashMap;

/// Non-persisted state carried across the steps of one pipeline run.
///
/// Metadata written here accumulates across steps and is merged into the
/// final message after the last transformer; later writes win.
#[derive(Debug, Clone)]
pub struct TransformContext {
    key: IdempotencyKey,
    attempt: u32,
    metadata_updates: HashMap<String, String>,
}

impl TransformContext {
    pub fn new(key: IdempotencyKey, attempt: u32) -> Self {
        Self {
            key,
            attempt,
            metadata_updates: HashMap::new(),
        }
    }

    /// Idempotency key of the message under transformation.
    pub fn key(&self) -> &IdempotencyKey {
        &self.key
    }

    /// 1-based attempt this pipeline run belongs to.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Stage a metadata entry for the outbound message.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata_updates.insert(key.into(), value.into());
    }

    pub fn metadata_updates(&self) -> &HashMap<String, String> {
        &self.metadata_updates
    }
}
