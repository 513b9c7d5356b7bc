//! # Connector Transformation - Ordered Pipeline
//!
//! ## Purpose
//! Maps inbound payloads and metadata to their outbound representation
//! before the send. Transformers are registered with an optional order key
//! and run as a stable ascending chain; each step returns a new message,
//! signals a drop (the journal records `SKIPPED`), or signals a failure
//! (the journal records the cause, classified retriable or not).
//!
//! Transformers must be side-effect-free with respect to external systems
//! except through the returned message; the pipeline gives no transactional
//! guarantee for transformer-internal I/O. A panicking transformer is
//! treated exactly like an explicit failure signal, with the panic payload
//! captured as the cause.

pub mod context;
pub mod pipeline;
pub mod transformer;

pub use context::TransformContext;
pub use pipeline::{PipelineOutcome, TransformPipeline};
pub use transformer::{PassThroughTransformer, TransformOutcome, Transformer};
