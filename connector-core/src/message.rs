//! Canonical message carried through the relay pipeline.
//!
//! A [`Message`] is built once by an inbound receiver and never mutated in
//! place; transformations produce new values through the `with_*` methods.

use crate::error::ConnectorError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Immutable representation of one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    id: String,
    source: String,
    payload: Vec<u8>,
    metadata: HashMap<String, String>,
    received_at: DateTime<Utc>,
}

impl Message {
    /// Create a message with an empty metadata map.
    ///
    /// Fails with [`ConnectorError::InvalidMessage`] when the identifier or
    /// source transport tag is empty.
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        payload: Vec<u8>,
    ) -> Result<Self, ConnectorError> {
        Self::with_metadata(id, source, payload, HashMap::new())
    }

    /// Create a message with metadata.
    pub fn with_metadata(
        id: impl Into<String>,
        source: impl Into<String>,
        payload: Vec<u8>,
        metadata: HashMap<String, String>,
    ) -> Result<Self, ConnectorError> {
        let id = id.into();
        let source = source.into();
        if id.trim().is_empty() {
            return Err(ConnectorError::InvalidMessage(
                "message identifier must not be empty".to_string(),
            ));
        }
        if source.trim().is_empty() {
            return Err(ConnectorError::InvalidMessage(
                "source transport tag must not be empty".to_string(),
            ));
        }
        Ok(Self {
            id,
            source,
            payload,
            metadata,
            received_at: Utc::now(),
        })
    }

    /// Opaque message identifier assigned at ingress.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Tag of the transport that produced this message (e.g. "kafka").
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Raw payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Metadata map (header-style string pairs).
    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    /// Look up a single metadata value.
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// When the receiver constructed this message.
    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// New message with a replaced payload, everything else carried over.
    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    /// New message with one metadata entry added or replaced.
    pub fn with_metadata_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// New message with the whole metadata map replaced.
    pub fn with_replaced_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::new("msg-1", "http", b"hello".to_vec()).unwrap();
        assert_eq!(msg.id(), "msg-1");
        assert_eq!(msg.source(), "http");
        assert_eq!(msg.payload(), b"hello");
        assert!(msg.metadata().is_empty());
    }

    #[test]
    fn test_empty_identifier_rejected() {
        let result = Message::new("", "http", Vec::new());
        assert!(matches!(result, Err(ConnectorError::InvalidMessage(_))));

        let result = Message::new("  ", "http", Vec::new());
        assert!(matches!(result, Err(ConnectorError::InvalidMessage(_))));
    }

    #[test]
    fn test_empty_source_rejected() {
        let result = Message::new("msg-1", "", Vec::new());
        assert!(matches!(result, Err(ConnectorError::InvalidMessage(_))));
    }

    #[test]
    fn test_with_methods_produce_new_values() {
        let msg = Message::new("msg-1", "jms", b"a".to_vec()).unwrap();
        let original = msg.clone();

        let updated = msg
            .with_payload(b"b".to_vec())
            .with_metadata_entry("content-type", "text/plain");

        assert_eq!(updated.payload(), b"b");
        assert_eq!(updated.metadata_value("content-type"), Some("text/plain"));
        // Original untouched.
        assert_eq!(original.payload(), b"a");
        assert!(original.metadata_value("content-type").is_none());
    }

    #[test]
    fn test_metadata_lookup() {
        let mut metadata = HashMap::new();
        metadata.insert("x-tenant".to_string(), "acme".to_string());
        let msg = Message::with_metadata("msg-2", "kafka", Vec::new(), metadata).unwrap();

        assert_eq!(msg.metadata_value("x-tenant"), Some("acme"));
        assert_eq!(msg.metadata_value("missing"), None);
    }
}
