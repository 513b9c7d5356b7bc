//! Ordered transformer chain with drop/fail signalling.

use crate::context::TransformContext;
use crate::transformer::{TransformOutcome, Transformer};
use connector_core::{FailureCause, FailureKind, Message};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Default order key assigned by [`TransformPipeline::register`].
const DEFAULT_ORDER: i32 = 0;

/// Result of running the whole chain over one message.
#[derive(Debug)]
pub enum PipelineOutcome {
    /// All steps ran; context metadata is already merged in.
    Transformed(Message),
    /// A step signalled an intentional discard.
    Dropped { stage: String },
    /// A step signalled failure or panicked.
    Failed { stage: String, cause: FailureCause },
}

struct Step {
    order: i32,
    transformer: Arc<dyn Transformer>,
}

/// Ordered chain of transformation steps.
///
/// Execution order is ascending by order key; steps sharing a key run in
/// registration order (the sort is stable).
#[derive(Default)]
pub struct TransformPipeline {
    steps: Vec<Step>,
}

impl TransformPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a step at the default order key.
    pub fn register(&mut self, transformer: Arc<dyn Transformer>) -> &mut Self {
        self.register_with_order(transformer, DEFAULT_ORDER)
    }

    /// Register a step with an explicit order key.
    pub fn register_with_order(
        &mut self,
        transformer: Arc<dyn Transformer>,
        order: i32,
    ) -> &mut Self {
        self.steps.push(Step { order, transformer });
        self.steps.sort_by_key(|step| step.order);
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step in order, then merge the context's accumulated
    /// metadata into the final message.
    pub fn apply(&self, message: Message, ctx: &mut TransformContext) -> PipelineOutcome {
        let mut current = message;

        for step in &self.steps {
            let outcome =
                catch_unwind(AssertUnwindSafe(|| step.transformer.apply(current, ctx)));

            match outcome {
                Ok(TransformOutcome::Next(next)) => current = next,
                Ok(TransformOutcome::Drop) => {
                    tracing::debug!(key = %ctx.key(), stage = step.transformer.name(), "message dropped by transformer");
                    return PipelineOutcome::Dropped {
                        stage: step.transformer.name().to_string(),
                    };
                }
                Ok(TransformOutcome::Fail(cause)) => {
                    tracing::warn!(key = %ctx.key(), stage = step.transformer.name(), cause = %cause, "transformer failed");
                    return PipelineOutcome::Failed {
                        stage: step.transformer.name().to_string(),
                        cause,
                    };
                }
                Err(panic) => {
                    let detail = panic_detail(panic.as_ref());
                    tracing::warn!(key = %ctx.key(), stage = step.transformer.name(), detail = %detail, "transformer panicked");
                    return PipelineOutcome::Failed {
                        stage: step.transformer.name().to_string(),
                        cause: FailureCause::new(FailureKind::Other, detail),
                    };
                }
            }
        }

        for (key, value) in ctx.metadata_updates() {
            current = current.with_metadata_entry(key.clone(), value.clone());
        }
        PipelineOutcome::Transformed(current)
    }
}

fn panic_detail(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(detail) = panic.downcast_ref::<String>() {
        detail.clone()
    } else if let Some(detail) = panic.downcast_ref::<&str>() {
        (*detail).to_string()
    } else {
        "transformer panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connector_core::IdempotencyKey;

    /// Appends a tag to the payload, making application order observable.
    struct TagTransformer {
        name: String,
        tag: Vec<u8>,
    }

    impl TagTransformer {
        fn new(name: &str, tag: &[u8]) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                tag: tag.to_vec(),
            })
        }
    }

    impl Transformer for TagTransformer {
        fn name(&self) -> &str {
            &self.name
        }

        fn apply(&self, message: Message, _ctx: &mut TransformContext) -> TransformOutcome {
            let mut payload = message.payload().to_vec();
            payload.extend_from_slice(&self.tag);
            TransformOutcome::Next(message.with_payload(payload))
        }
    }

    struct DroppingTransformer;

    impl Transformer for DroppingTransformer {
        fn name(&self) -> &str {
            "dropper"
        }

        fn apply(&self, _message: Message, _ctx: &mut TransformContext) -> TransformOutcome {
            TransformOutcome::Drop
        }
    }

    struct PanickingTransformer;

    impl Transformer for PanickingTransformer {
        fn name(&self) -> &str {
            "panicker"
        }

        fn apply(&self, _message: Message, _ctx: &mut TransformContext) -> TransformOutcome {
            panic!("boom in step")
        }
    }

    fn message() -> Message {
        Message::new("m-1", "http", b"x".to_vec()).unwrap()
    }

    fn ctx(message: &Message) -> TransformContext {
        TransformContext::new(IdempotencyKey::derive(message), 1)
    }

    #[test]
    fn test_order_keys_control_application_order() {
        let mut pipeline = TransformPipeline::new();
        pipeline.register_with_order(TagTransformer::new("t2", b"2"), 2);
        pipeline.register_with_order(TagTransformer::new("t1", b"1"), 1);

        let msg = message();
        let mut ctx = ctx(&msg);
        match pipeline.apply(msg, &mut ctx) {
            PipelineOutcome::Transformed(out) => assert_eq!(out.payload(), b"x12"),
            other => panic!("unexpected outcome: {:?}", other),
        }

        // Reversed keys reverse the effective order.
        let mut pipeline = TransformPipeline::new();
        pipeline.register_with_order(TagTransformer::new("t2", b"2"), 1);
        pipeline.register_with_order(TagTransformer::new("t1", b"1"), 2);

        let msg = message();
        let mut ctx2 = TransformContext::new(IdempotencyKey::derive(&msg), 1);
        match pipeline.apply(msg, &mut ctx2) {
            PipelineOutcome::Transformed(out) => assert_eq!(out.payload(), b"x21"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_ties_run_in_registration_order() {
        let mut pipeline = TransformPipeline::new();
        pipeline.register(TagTransformer::new("a", b"a"));
        pipeline.register(TagTransformer::new("b", b"b"));
        pipeline.register(TagTransformer::new("c", b"c"));

        let msg = message();
        let mut ctx = ctx(&msg);
        match pipeline.apply(msg, &mut ctx) {
            PipelineOutcome::Transformed(out) => assert_eq!(out.payload(), b"xabc"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_drop_stops_the_chain() {
        let mut pipeline = TransformPipeline::new();
        pipeline.register_with_order(Arc::new(DroppingTransformer), 1);
        pipeline.register_with_order(TagTransformer::new("never", b"!"), 2);

        let msg = message();
        let mut ctx = ctx(&msg);
        match pipeline.apply(msg, &mut ctx) {
            PipelineOutcome::Dropped { stage } => assert_eq!(stage, "dropper"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_panic_treated_as_failure_with_captured_cause() {
        let mut pipeline = TransformPipeline::new();
        pipeline.register(Arc::new(PanickingTransformer));

        let msg = message();
        let mut ctx = ctx(&msg);
        match pipeline.apply(msg, &mut ctx) {
            PipelineOutcome::Failed { stage, cause } => {
                assert_eq!(stage, "panicker");
                assert_eq!(cause.kind, FailureKind::Other);
                assert!(cause.detail.contains("boom in step"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_context_metadata_merged_into_result() {
        struct MetadataTransformer;

        impl Transformer for MetadataTransformer {
            fn name(&self) -> &str {
                "metadata"
            }

            fn apply(&self, message: Message, ctx: &mut TransformContext) -> TransformOutcome {
                ctx.set_metadata("x-routed-by", "pipeline");
                TransformOutcome::Next(message)
            }
        }

        let mut pipeline = TransformPipeline::new();
        pipeline.register(Arc::new(MetadataTransformer));

        let msg = message();
        let mut ctx = ctx(&msg);
        match pipeline.apply(msg, &mut ctx) {
            PipelineOutcome::Transformed(out) => {
                assert_eq!(out.metadata_value("x-routed-by"), Some("pipeline"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_empty_pipeline_passes_message_through() {
        let pipeline = TransformPipeline::new();
        let msg = message();
        let mut ctx = ctx(&msg);
        match pipeline.apply(msg.clone(), &mut ctx) {
            PipelineOutcome::Transformed(out) => assert_eq!(out, msg),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
