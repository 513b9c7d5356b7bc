//! Receiver pump: the scheduler side of the relay loop.
//!
//! `relay` is synchronous per attempt and owns no timer; the pump plays
//! the external scheduler role, resubmitting `Retrying` outcomes until a
//! terminal outcome or the resubmission budget runs out. Backoff already
//! happened inside `relay` before a `Retrying` outcome is returned, so the
//! pump resubmits immediately.

use crate::engine::{RelayEngine, RelayOutcome};
use connector_core::{ConnectorError, InboundReceiver};

/// Tally of one pump run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PumpSummary {
    pub processed: u64,
    pub delivered: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Messages given up on without a terminal journal state (e.g. the
    /// journal stayed unavailable through every resubmission).
    pub abandoned: u64,
}

impl RelayEngine {
    /// Drain the receiver, relaying every message to a terminal outcome.
    ///
    /// Returns when the receiver is exhausted. Structural faults abort the
    /// run and surface to the caller.
    pub async fn run<R: InboundReceiver>(
        &self,
        receiver: &mut R,
    ) -> Result<PumpSummary, ConnectorError> {
        let mut summary = PumpSummary::default();

        while let Some(message) = receiver.receive().await? {
            summary.processed += 1;
            let mut resubmissions = 0u32;
            loop {
                match self.relay(message.clone()).await? {
                    RelayOutcome::Delivered(_) => {
                        summary.delivered += 1;
                        break;
                    }
                    RelayOutcome::Skipped => {
                        summary.skipped += 1;
                        break;
                    }
                    RelayOutcome::Failed(_) => {
                        summary.failed += 1;
                        break;
                    }
                    RelayOutcome::Retrying { .. } => {
                        resubmissions += 1;
                        // Attempt accounting lives in the journal; this
                        // bound only protects against a store that never
                        // comes back.
                        if resubmissions > self.config().max_attempts {
                            tracing::warn!(
                                resubmissions,
                                "abandoning message without terminal journal state"
                            );
                            summary.abandoned += 1;
                            break;
                        }
                    }
                }
            }
        }
        Ok(summary)
    }
}
