//! Transport SPI: inbound receivers and outbound senders.
//!
//! One implementation exists per transport (HTTP, gRPC, Kafka, JMS); the
//! relay engine depends only on these traits. Redelivery of the same
//! logical message by a receiver is expected — idempotency handles it, the
//! receiver does not have to prevent it.

use crate::error::{ConnectorError, FailureCause};
use crate::message::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Acknowledgment returned by an outbound transport after a successful send.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundResult {
    /// Receipt identifier assigned by the destination (e.g. a Kafka
    /// offset, an HTTP location, a JMS message id).
    pub receipt: String,
}

impl OutboundResult {
    pub fn new(receipt: impl Into<String>) -> Self {
        Self {
            receipt: receipt.into(),
        }
    }
}

/// SPI for inbound (server-side) transports.
///
/// Produces a lazy, restartable sequence of messages; `None` means the
/// source is exhausted or shut down.
#[async_trait]
pub trait InboundReceiver: Send {
    async fn receive(&mut self) -> Result<Option<Message>, ConnectorError>;
}

/// SPI for outbound (client-side) transports.
///
/// Implementations should honor cancellation: the engine invokes `send`
/// under a timeout and classifies an elapsed timeout as retriable.
#[async_trait]
pub trait OutboundSender: Send + Sync {
    async fn send(&self, message: &Message) -> Result<OutboundResult, FailureCause>;
}
