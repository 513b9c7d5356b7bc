//! Failure taxonomy for the relay engine.
//!
//! Two layers: [`FailureCause`] describes why a single transform or send
//! attempt failed and carries the [`FailureKind`] the retry classification
//! table is keyed by; [`ConnectorError`] is the surfaced fault type for
//! structural problems the engine never absorbs into a retry.

use crate::journal::JournalError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse classification of a transform/send failure.
///
/// The retry table in [`crate::config::RetryClassification`] maps each kind
/// to retriable or not; adapters should pick the closest kind rather than
/// defaulting everything to `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Send or journal commit exceeded the caller-supplied timeout.
    Timeout,
    /// Transport-level connection problem (refused, reset, lost).
    Connection,
    /// Malformed-request style cause; never worth retrying.
    Malformed,
    /// Remote side understood and rejected the message.
    Rejected,
    /// Payload could not be encoded/decoded by a transformer.
    Serialization,
    /// Journal store access fault.
    JournalUnavailable,
    /// Anything else, including captured panics.
    Other,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Connection => "connection",
            FailureKind::Malformed => "malformed",
            FailureKind::Rejected => "rejected",
            FailureKind::Serialization => "serialization",
            FailureKind::JournalUnavailable => "journal_unavailable",
            FailureKind::Other => "other",
        };
        write!(f, "{}", name)
    }
}

/// Cause of a failed transform or send attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureCause {
    pub kind: FailureKind,
    pub detail: String,
}

impl FailureCause {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, detail)
    }

    pub fn connection(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Connection, detail)
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Malformed, detail)
    }

    pub fn rejected(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Rejected, detail)
    }

    pub fn serialization(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Serialization, detail)
    }

    pub fn journal_unavailable(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::JournalUnavailable, detail)
    }

    pub fn other(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Other, detail)
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

/// Faults surfaced to the caller of the relay engine.
///
/// Recoverable transform/send failures never appear here; they are absorbed
/// into a `Retrying` outcome. Anything in this enum means the input or the
/// journal usage is structurally wrong.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectorError {
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error(transparent)]
    Journal(#[from] JournalError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_cause_display() {
        let cause = FailureCause::timeout("send exceeded 5s");
        assert_eq!(cause.to_string(), "timeout: send exceeded 5s");
        assert_eq!(cause.kind, FailureKind::Timeout);
    }

    #[test]
    fn test_failure_kind_serde_snake_case() {
        let json = serde_json::to_string(&FailureKind::JournalUnavailable).unwrap();
        assert_eq!(json, "\"journal_unavailable\"");

        let kind: FailureKind = serde_json::from_str("\"malformed\"").unwrap();
        assert_eq!(kind, FailureKind::Malformed);
    }
}
