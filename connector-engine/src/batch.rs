//! Batch relay: drive a whole vector of messages through the engine.

use crate::engine::{RelayEngine, RelayOutcome};
use connector_core::{ConnectorError, FailureCause, Message};

/// Per-outcome tally of one batch, with indexed causes for the messages
/// that did not reach a successful terminal state.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub total: usize,
    pub delivered: usize,
    pub skipped: usize,
    /// `(index, cause)` for messages awaiting resubmission.
    pub retrying: Vec<(usize, FailureCause)>,
    /// `(index, cause)` for terminally failed messages.
    pub failed: Vec<(usize, FailureCause)>,
}

impl BatchReport {
    fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Every message reached `Delivered` or `Skipped`.
    pub fn is_complete_success(&self) -> bool {
        self.delivered + self.skipped == self.total
    }

    pub fn has_retries(&self) -> bool {
        !self.retrying.is_empty()
    }
}

impl RelayEngine {
    /// Relay each message in order, tallying outcomes.
    ///
    /// A structural fault aborts the batch; retriable conditions are
    /// recorded per message and never stop the remaining sends.
    pub async fn relay_batch(&self, messages: Vec<Message>) -> Result<BatchReport, ConnectorError> {
        let mut report = BatchReport::new(messages.len());
        for (index, message) in messages.into_iter().enumerate() {
            match self.relay(message).await? {
                RelayOutcome::Delivered(_) => report.delivered += 1,
                RelayOutcome::Skipped => report.skipped += 1,
                RelayOutcome::Failed(cause) => report.failed.push((index, cause)),
                RelayOutcome::Retrying { cause, .. } => report.retrying.push((index, cause)),
            }
        }
        Ok(report)
    }
}
