//! Journal contract: record shape, state machine data, and the store SPI.
//!
//! ## State Machine
//! ```text
//! RECEIVED ──> DELIVERED | RETRYING | FAILED | SKIPPED
//! RETRYING ──> DELIVERED | RETRYING | FAILED
//! ```
//! `DELIVERED`, `FAILED`, and `SKIPPED` are terminal. The engine never
//! mutates records directly; every transition goes through the journal
//! service, and the store must apply each transition atomically under
//! concurrent callers for the same key.

use crate::error::FailureCause;
use crate::idempotency::IdempotencyKey;
use crate::transport::OutboundResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Relay attempt state recorded in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelayState {
    Received,
    Retrying,
    Delivered,
    Failed,
    Skipped,
}

impl RelayState {
    /// Terminal states admit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RelayState::Delivered | RelayState::Failed | RelayState::Skipped
        )
    }

    /// Whether the state machine admits `self -> to`.
    pub fn can_transition_to(&self, to: RelayState) -> bool {
        match self {
            RelayState::Received => matches!(
                to,
                RelayState::Delivered
                    | RelayState::Retrying
                    | RelayState::Failed
                    | RelayState::Skipped
            ),
            RelayState::Retrying => matches!(
                to,
                RelayState::Delivered | RelayState::Retrying | RelayState::Failed
            ),
            RelayState::Delivered | RelayState::Failed | RelayState::Skipped => false,
        }
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Matches the serde SCREAMING_SNAKE_CASE rendering.
        let name = match self {
            RelayState::Received => "RECEIVED",
            RelayState::Retrying => "RETRYING",
            RelayState::Delivered => "DELIVERED",
            RelayState::Failed => "FAILED",
            RelayState::Skipped => "SKIPPED",
        };
        write!(f, "{}", name)
    }
}

/// Durable record of one relay attempt-set, keyed by idempotency key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord {
    pub key: IdempotencyKey,
    pub state: RelayState,
    /// Number of attempts started (the first attempt counts as 1).
    pub attempt_count: u32,
    pub last_error: Option<FailureCause>,
    /// Sender acknowledgment, present once `DELIVERED`.
    pub outbound_result: Option<OutboundResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JournalRecord {
    /// Fresh record in `RECEIVED` with the first attempt underway.
    pub fn new(key: IdempotencyKey) -> Self {
        let now = Utc::now();
        Self {
            key,
            state: RelayState::Received,
            attempt_count: 1,
            last_error: None,
            outbound_result: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Result of the atomic insert-or-fetch at the start of a relay attempt.
#[derive(Debug, Clone)]
pub enum BeginOutcome {
    /// No record existed; a fresh `RECEIVED` record was inserted.
    Created(JournalRecord),
    /// A record already existed and was returned unmodified.
    Resumed(JournalRecord),
}

impl BeginOutcome {
    pub fn record(&self) -> &JournalRecord {
        match self {
            BeginOutcome::Created(record) | BeginOutcome::Resumed(record) => record,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, BeginOutcome::Created(_))
    }
}

/// Write applied by one guarded transition.
///
/// The store resolves the patch against the current record under its
/// per-key guard, so a decision that depends on the stored attempt count
/// (`FailAttempt`) is atomic with the write; two concurrent callers can
/// never both resolve against the same stale count.
#[derive(Debug, Clone)]
pub enum RecordPatch {
    /// Close as `DELIVERED`, storing the sender's receipt.
    Delivered(OutboundResult),
    /// Record a failed attempt: `RETRYING` with the count advanced while
    /// the current count is below `max_attempts`, terminal `FAILED` once
    /// the budget is spent.
    FailAttempt {
        cause: FailureCause,
        max_attempts: u32,
    },
    /// Close as terminal `FAILED` regardless of the attempt count.
    Failed(FailureCause),
    /// Close as `SKIPPED`.
    Skipped,
}

impl RecordPatch {
    /// State this patch moves a record with `current_attempts` into.
    pub fn target_state(&self, current_attempts: u32) -> RelayState {
        match self {
            RecordPatch::Delivered(_) => RelayState::Delivered,
            RecordPatch::FailAttempt { max_attempts, .. } => {
                if current_attempts < *max_attempts {
                    RelayState::Retrying
                } else {
                    RelayState::Failed
                }
            }
            RecordPatch::Failed(_) => RelayState::Failed,
            RecordPatch::Skipped => RelayState::Skipped,
        }
    }
}

/// Journal store faults.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JournalError {
    #[error("no journal record for key {0}")]
    NotFound(IdempotencyKey),

    #[error("invalid journal transition for {key}: {from} -> {to}")]
    InvalidTransition {
        key: IdempotencyKey,
        from: RelayState,
        to: RelayState,
    },

    #[error("journal store unavailable: {0}")]
    Unavailable(String),
}

/// SPI implemented by the persistence adapter backing the journal.
///
/// `insert_or_fetch` and `transition` must each execute atomically against
/// the backing store (single transaction, conditional write, or equivalent)
/// so that concurrent relay attempts for one key serialize on the record.
/// `transition` resolves the patch (including the `FailAttempt`
/// retry-vs-terminal split) against the record it reads under that guard.
#[async_trait]
pub trait JournalStore: Send + Sync {
    /// Insert the record if its key is unused, otherwise return the existing
    /// record without modification.
    async fn insert_or_fetch(&self, record: JournalRecord) -> Result<BeginOutcome, JournalError>;

    /// Apply `patch` to the record iff its current state is in
    /// `allowed_from`; fail with `InvalidTransition` otherwise.
    async fn transition(
        &self,
        key: &IdempotencyKey,
        allowed_from: &[RelayState],
        patch: RecordPatch,
    ) -> Result<JournalRecord, JournalError>;

    /// Point lookup.
    async fn load(&self, key: &IdempotencyKey) -> Result<Option<JournalRecord>, JournalError>;
}
