//! Transformer trait and the bundled pass-through step.

use crate::context::TransformContext;
use connector_core::{FailureCause, Message};

/// What one transformation step did with the message.
#[derive(Debug)]
pub enum TransformOutcome {
    /// Continue the chain with this (possibly new) message.
    Next(Message),
    /// Intentionally discard the message; not an error.
    Drop,
    /// Abort the remaining steps with a cause.
    Fail(FailureCause),
}

/// One named transformation step.
pub trait Transformer: Send + Sync {
    /// Stable name used in journal causes and lifecycle events.
    fn name(&self) -> &str;

    fn apply(&self, message: Message, ctx: &mut TransformContext) -> TransformOutcome;
}

/// Identity step for pipelines that relay payloads unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThroughTransformer;

impl Transformer for PassThroughTransformer {
    fn name(&self) -> &str {
        "pass-through"
    }

    fn apply(&self, message: Message, _ctx: &mut TransformContext) -> TransformOutcome {
        TransformOutcome::Next(message)
    }
}
