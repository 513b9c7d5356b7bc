//! In-memory journal store backed by a concurrent keyed map.
//!
//! DashMap's per-shard locking gives the per-key atomicity the store SPI
//! requires: `insert_or_fetch` uses the entry API and `transition` mutates
//! under the shard guard, so two concurrent callers for one key always
//! observe each other's writes.

use async_trait::async_trait;
use chrono::Utc;
use connector_core::{
    BeginOutcome, IdempotencyKey, JournalError, JournalRecord, JournalStore, RecordPatch,
    RelayState,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Journal store for single-process deployments and tests.
///
/// Records persist for the lifetime of the process; retention is an
/// external concern.
#[derive(Debug, Default)]
pub struct MemoryJournalStore {
    records: DashMap<IdempotencyKey, JournalRecord>,
}

impl MemoryJournalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl JournalStore for MemoryJournalStore {
    async fn insert_or_fetch(&self, record: JournalRecord) -> Result<BeginOutcome, JournalError> {
        match self.records.entry(record.key.clone()) {
            Entry::Occupied(existing) => Ok(BeginOutcome::Resumed(existing.get().clone())),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(BeginOutcome::Created(record))
            }
        }
    }

    async fn transition(
        &self,
        key: &IdempotencyKey,
        allowed_from: &[RelayState],
        patch: RecordPatch,
    ) -> Result<JournalRecord, JournalError> {
        let mut entry = self
            .records
            .get_mut(key)
            .ok_or_else(|| JournalError::NotFound(key.clone()))?;

        // The patch is resolved against the record while the shard guard is
        // held, so the FailAttempt retry-vs-terminal split can never act on
        // a stale attempt count.
        let target = patch.target_state(entry.attempt_count);
        if !allowed_from.contains(&entry.state) {
            return Err(JournalError::InvalidTransition {
                key: key.clone(),
                from: entry.state,
                to: target,
            });
        }

        match patch {
            RecordPatch::Delivered(result) => {
                entry.state = RelayState::Delivered;
                entry.outbound_result = Some(result);
            }
            RecordPatch::FailAttempt { cause, .. } => {
                entry.state = target;
                if target == RelayState::Retrying {
                    entry.attempt_count += 1;
                }
                entry.last_error = Some(cause);
            }
            RecordPatch::Failed(cause) => {
                entry.state = RelayState::Failed;
                entry.last_error = Some(cause);
            }
            RecordPatch::Skipped => {
                entry.state = RelayState::Skipped;
            }
        }
        entry.updated_at = Utc::now();
        Ok(entry.value().clone())
    }

    async fn load(&self, key: &IdempotencyKey) -> Result<Option<JournalRecord>, JournalError> {
        Ok(self.records.get(key).map(|entry| entry.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connector_core::{FailureCause, OutboundResult};

    fn key(name: &str) -> IdempotencyKey {
        IdempotencyKey::from(name)
    }

    #[tokio::test]
    async fn test_insert_or_fetch_created_then_resumed() {
        let store = MemoryJournalStore::new();
        let record = JournalRecord::new(key("http:a"));

        let first = store.insert_or_fetch(record.clone()).await.unwrap();
        assert!(first.is_created());

        let second = store.insert_or_fetch(JournalRecord::new(key("http:a"))).await.unwrap();
        assert!(!second.is_created());
        assert_eq!(second.record().key, record.key);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_transition_applies_patch() {
        let store = MemoryJournalStore::new();
        store
            .insert_or_fetch(JournalRecord::new(key("http:b")))
            .await
            .unwrap();

        let updated = store
            .transition(
                &key("http:b"),
                &[RelayState::Received],
                RecordPatch::FailAttempt {
                    cause: FailureCause::connection("reset"),
                    max_attempts: 3,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.state, RelayState::Retrying);
        assert_eq!(updated.attempt_count, 2);
        assert!(updated.last_error.is_some());
        assert!(updated.updated_at >= updated.created_at);
    }

    #[tokio::test]
    async fn test_fail_attempt_goes_terminal_at_the_budget() {
        let store = MemoryJournalStore::new();
        store
            .insert_or_fetch(JournalRecord::new(key("http:cap")))
            .await
            .unwrap();

        // Count 1 against a budget of 1: terminal, count untouched.
        let record = store
            .transition(
                &key("http:cap"),
                &[RelayState::Received],
                RecordPatch::FailAttempt {
                    cause: FailureCause::timeout("t"),
                    max_attempts: 1,
                },
            )
            .await
            .unwrap();
        assert_eq!(record.state, RelayState::Failed);
        assert_eq!(record.attempt_count, 1);
    }

    #[tokio::test]
    async fn test_transition_guard_rejects_wrong_state() {
        let store = MemoryJournalStore::new();
        store
            .insert_or_fetch(JournalRecord::new(key("http:c")))
            .await
            .unwrap();
        store
            .transition(
                &key("http:c"),
                &[RelayState::Received],
                RecordPatch::Delivered(OutboundResult::new("r-1")),
            )
            .await
            .unwrap();

        let result = store
            .transition(
                &key("http:c"),
                &[RelayState::Received, RelayState::Retrying],
                RecordPatch::Skipped,
            )
            .await;
        assert!(matches!(
            result,
            Err(JournalError::InvalidTransition {
                from: RelayState::Delivered,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_transition_missing_key() {
        let store = MemoryJournalStore::new();
        let result = store
            .transition(&key("http:missing"), &[RelayState::Received], RecordPatch::Skipped)
            .await;
        assert!(matches!(result, Err(JournalError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_concurrent_insert_or_fetch_single_creation() {
        use std::sync::Arc;

        let store = Arc::new(MemoryJournalStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .insert_or_fetch(JournalRecord::new(key("http:dup-1")))
                    .await
                    .unwrap()
                    .is_created()
            }));
        }

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(store.len(), 1);
    }
}
