//! # Connector Core - Transport-Agnostic Relay Abstractions
//!
//! ## Purpose
//! Defines the message model, transport SPI, journal contract, failure
//! taxonomy, and observer hooks shared by every piece of the connector
//! relay engine. Concrete transports (HTTP, gRPC, Kafka, JMS) and journal
//! stores plug in behind the traits declared here; the engine depends only
//! on the abstractions.
//!
//! ## Architecture Role
//! ```text
//! InboundReceiver → RelayEngine → TransformPipeline → OutboundSender
//!                        ↓
//!                     Journal (JournalStore SPI)
//!                        ↓
//!                  RelayObserver (lifecycle events)
//! ```
//!
//! The correctness backbone is the idempotency key: one journal record per
//! key, state advancing forward only, so redelivery from an at-least-once
//! upstream is always safe to replay through the engine.

pub mod config;
pub mod error;
pub mod idempotency;
pub mod journal;
pub mod message;
pub mod observer;
pub mod transport;

pub use config::{BackoffConfig, ConfigError, RelayConfig, RetryClassification};
pub use error::{ConnectorError, FailureCause, FailureKind};
pub use idempotency::{correlation_id_from_metadata, IdempotencyKey, CORRELATION_ID_HEADER};
pub use journal::{
    BeginOutcome, JournalError, JournalRecord, JournalStore, RecordPatch, RelayState,
};
pub use message::Message;
pub use observer::{
    MetricsObserver, MetricsSnapshot, NoOpObserver, RelayEvent, RelayObserver, TracingObserver,
    TransformDisposition,
};
pub use transport::{InboundReceiver, OutboundResult, OutboundSender};
