//! Journal service: the only writer of relay state.
//!
//! Every transition the engine needs goes through here; the service decides
//! the target state (including the retry-vs-terminal split in
//! [`Journal::mark_failed`]) and delegates the atomic guarded write to the
//! store.

use connector_core::{
    BeginOutcome, FailureCause, IdempotencyKey, JournalError, JournalRecord, JournalStore,
    OutboundResult, RecordPatch, RelayState,
};
use std::sync::Arc;

/// Non-terminal states a closing transition may start from.
const OPEN_STATES: [RelayState; 2] = [RelayState::Received, RelayState::Retrying];

/// State-machine-enforcing facade over a [`JournalStore`].
#[derive(Clone)]
pub struct Journal {
    store: Arc<dyn JournalStore>,
    max_attempts: u32,
}

impl Journal {
    pub fn new(store: Arc<dyn JournalStore>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Atomically insert a fresh `RECEIVED` record, or return the existing
    /// record unmodified.
    pub async fn begin_or_resume(
        &self,
        key: &IdempotencyKey,
    ) -> Result<BeginOutcome, JournalError> {
        let outcome = self
            .store
            .insert_or_fetch(JournalRecord::new(key.clone()))
            .await?;
        if outcome.is_created() {
            tracing::debug!(key = %key, "journal record created");
        } else {
            tracing::debug!(key = %key, state = %outcome.record().state, "journal record resumed");
        }
        Ok(outcome)
    }

    /// Close the attempt as `DELIVERED`, storing the sender's receipt.
    pub async fn mark_delivered(
        &self,
        key: &IdempotencyKey,
        result: OutboundResult,
    ) -> Result<JournalRecord, JournalError> {
        let record = self
            .store
            .transition(key, &OPEN_STATES, RecordPatch::Delivered(result))
            .await?;
        tracing::info!(key = %key, attempts = record.attempt_count, "relay delivered");
        Ok(record)
    }

    /// Record a failed attempt in one guarded transition.
    ///
    /// While `retriable` and the attempt count is below the configured
    /// maximum, the record moves to `RETRYING` and the count advances to
    /// name the attempt being scheduled; otherwise the record goes terminal
    /// `FAILED`. The store resolves that split against the count it holds
    /// under its guard, so concurrent failures for one key can never both
    /// schedule a retry past the budget.
    pub async fn mark_failed(
        &self,
        key: &IdempotencyKey,
        cause: FailureCause,
        retriable: bool,
    ) -> Result<JournalRecord, JournalError> {
        let patch = if retriable {
            RecordPatch::FailAttempt {
                cause,
                max_attempts: self.max_attempts,
            }
        } else {
            RecordPatch::Failed(cause)
        };
        let record = self.store.transition(key, &OPEN_STATES, patch).await?;

        match record.state {
            RelayState::Retrying => {
                tracing::warn!(
                    key = %key,
                    attempts = record.attempt_count,
                    max_attempts = self.max_attempts,
                    "relay attempt failed, retry scheduled"
                );
            }
            _ => {
                tracing::warn!(key = %key, attempts = record.attempt_count, "relay failed terminally");
            }
        }
        Ok(record)
    }

    /// Close the attempt as `SKIPPED` (transformer-signaled drop).
    ///
    /// Only valid from `RECEIVED`; a retried message is past the point
    /// where a drop is meaningful.
    pub async fn mark_skipped(&self, key: &IdempotencyKey) -> Result<JournalRecord, JournalError> {
        let record = self
            .store
            .transition(key, &[RelayState::Received], RecordPatch::Skipped)
            .await?;
        tracing::info!(key = %key, "relay skipped");
        Ok(record)
    }

    /// Take over a record a crashed attempt left in `RECEIVED`.
    ///
    /// Guarded on `RECEIVED` alone, so exactly one caller wins the claim;
    /// once the record has moved, later callers observe `InvalidTransition`
    /// and must re-read the record instead. The claim charges the abandoned
    /// attempt against the budget: the winner receives the record in
    /// `RETRYING` (run the next attempt now) or terminal `FAILED` (budget
    /// spent).
    pub async fn claim_abandoned(
        &self,
        key: &IdempotencyKey,
        cause: FailureCause,
    ) -> Result<JournalRecord, JournalError> {
        let patch = RecordPatch::FailAttempt {
            cause,
            max_attempts: self.max_attempts,
        };
        let record = self
            .store
            .transition(key, &[RelayState::Received], patch)
            .await?;
        tracing::warn!(key = %key, state = %record.state, "abandoned record claimed");
        Ok(record)
    }

    /// Point lookup for resume/retry decisions.
    pub async fn load(&self, key: &IdempotencyKey) -> Result<Option<JournalRecord>, JournalError> {
        self.store.load(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryJournalStore;

    fn journal(max_attempts: u32) -> Journal {
        Journal::new(Arc::new(MemoryJournalStore::new()), max_attempts)
    }

    fn key(name: &str) -> IdempotencyKey {
        IdempotencyKey::from(name)
    }

    #[tokio::test]
    async fn test_begin_then_deliver() {
        let journal = journal(3);
        let key = key("http:d-1");

        let outcome = journal.begin_or_resume(&key).await.unwrap();
        assert!(outcome.is_created());
        assert_eq!(outcome.record().attempt_count, 1);

        let record = journal
            .mark_delivered(&key, OutboundResult::new("receipt-9"))
            .await
            .unwrap();
        assert_eq!(record.state, RelayState::Delivered);
        assert_eq!(
            record.outbound_result,
            Some(OutboundResult::new("receipt-9"))
        );
    }

    #[tokio::test]
    async fn test_retriable_failures_then_exhaustion() {
        let journal = journal(3);
        let key = key("http:f-1");
        journal.begin_or_resume(&key).await.unwrap();

        // Attempt 1 fails: schedule attempt 2.
        let record = journal
            .mark_failed(&key, FailureCause::timeout("t"), true)
            .await
            .unwrap();
        assert_eq!(record.state, RelayState::Retrying);
        assert_eq!(record.attempt_count, 2);

        // Attempt 2 fails: schedule attempt 3 (the last allowed).
        let record = journal
            .mark_failed(&key, FailureCause::timeout("t"), true)
            .await
            .unwrap();
        assert_eq!(record.state, RelayState::Retrying);
        assert_eq!(record.attempt_count, 3);

        // Attempt 3 fails: out of attempts, terminal.
        let record = journal
            .mark_failed(&key, FailureCause::timeout("t"), true)
            .await
            .unwrap();
        assert_eq!(record.state, RelayState::Failed);
        assert_eq!(record.attempt_count, 3);
    }

    #[tokio::test]
    async fn test_non_retriable_fails_immediately() {
        let journal = journal(3);
        let key = key("http:f-2");
        journal.begin_or_resume(&key).await.unwrap();

        let record = journal
            .mark_failed(&key, FailureCause::malformed("bad payload"), false)
            .await
            .unwrap();
        assert_eq!(record.state, RelayState::Failed);
        assert_eq!(record.attempt_count, 1);
    }

    #[tokio::test]
    async fn test_terminal_states_reject_every_mark() {
        let journal = journal(3);
        let key = key("http:t-1");
        journal.begin_or_resume(&key).await.unwrap();
        journal.mark_skipped(&key).await.unwrap();

        let delivered = journal
            .mark_delivered(&key, OutboundResult::new("r"))
            .await;
        assert!(matches!(
            delivered,
            Err(JournalError::InvalidTransition { .. })
        ));

        let failed = journal
            .mark_failed(&key, FailureCause::other("x"), true)
            .await;
        assert!(matches!(failed, Err(JournalError::InvalidTransition { .. })));

        let skipped = journal.mark_skipped(&key).await;
        assert!(matches!(
            skipped,
            Err(JournalError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_skip_not_allowed_from_retrying() {
        let journal = journal(3);
        let key = key("http:s-1");
        journal.begin_or_resume(&key).await.unwrap();
        journal
            .mark_failed(&key, FailureCause::timeout("t"), true)
            .await
            .unwrap();

        let result = journal.mark_skipped(&key).await;
        assert!(matches!(
            result,
            Err(JournalError::InvalidTransition {
                from: RelayState::Retrying,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_retriable_failures_stay_within_budget() {
        let journal = journal(3);
        let key = key("http:race-1");
        journal.begin_or_resume(&key).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let journal = journal.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                journal
                    .mark_failed(&key, FailureCause::timeout("t"), true)
                    .await
            }));
        }
        for handle in handles {
            // Late callers hit the terminal record; only the error kind
            // matters here, not which caller got it.
            let _ = handle.await.unwrap();
        }

        let record = journal.load(&key).await.unwrap().unwrap();
        assert_eq!(record.state, RelayState::Failed);
        assert_eq!(record.attempt_count, 3);
    }

    #[tokio::test]
    async fn test_claim_abandoned_is_exclusive() {
        let journal = journal(3);
        let key = key("http:claim-1");
        journal.begin_or_resume(&key).await.unwrap();

        let record = journal
            .claim_abandoned(&key, FailureCause::other("no commit observed"))
            .await
            .unwrap();
        assert_eq!(record.state, RelayState::Retrying);
        assert_eq!(record.attempt_count, 2);

        // The record has left RECEIVED; a second claim must lose.
        let result = journal
            .claim_abandoned(&key, FailureCause::other("no commit observed"))
            .await;
        assert!(matches!(
            result,
            Err(JournalError::InvalidTransition {
                from: RelayState::Retrying,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_claim_abandoned_with_spent_budget_goes_failed() {
        let journal = journal(1);
        let key = key("http:claim-2");
        journal.begin_or_resume(&key).await.unwrap();

        let record = journal
            .claim_abandoned(&key, FailureCause::other("no commit observed"))
            .await
            .unwrap();
        assert_eq!(record.state, RelayState::Failed);
        assert_eq!(record.attempt_count, 1);
    }

    #[tokio::test]
    async fn test_resume_returns_record_unmodified() {
        let journal = journal(3);
        let key = key("http:r-1");
        journal.begin_or_resume(&key).await.unwrap();
        journal
            .mark_delivered(&key, OutboundResult::new("r-42"))
            .await
            .unwrap();

        let outcome = journal.begin_or_resume(&key).await.unwrap();
        assert!(!outcome.is_created());
        assert_eq!(outcome.record().state, RelayState::Delivered);
        assert_eq!(
            outcome.record().outbound_result,
            Some(OutboundResult::new("r-42"))
        );
    }

    #[tokio::test]
    async fn test_load_missing_key() {
        let journal = journal(3);
        assert!(journal.load(&key("http:nope")).await.unwrap().is_none());
    }
}
