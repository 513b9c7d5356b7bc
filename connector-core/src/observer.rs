//! Observer hook: lifecycle notifications decoupled from control flow.
//!
//! The engine notifies synchronously at every transition. Observers must
//! not fail; the engine catches panics from `notify` and logs them, so a
//! broken observer can never change a relay outcome.

use crate::error::FailureCause;
use crate::idempotency::IdempotencyKey;
use crate::journal::RelayState;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle event emitted once per relay transition.
#[derive(Debug, Clone)]
pub enum RelayEvent {
    Received {
        key: IdempotencyKey,
        source: String,
    },
    TransformStarted {
        key: IdempotencyKey,
        attempt: u32,
    },
    TransformCompleted {
        key: IdempotencyKey,
        disposition: TransformDisposition,
    },
    SendStarted {
        key: IdempotencyKey,
        attempt: u32,
    },
    SendCompleted {
        key: IdempotencyKey,
        result: Result<String, FailureCause>,
    },
    JournalCommitted {
        key: IdempotencyKey,
        state: RelayState,
    },
}

/// How the transform pipeline disposed of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformDisposition {
    Continue,
    Dropped,
    Failed,
}

/// Notification capability invoked at each lifecycle transition.
pub trait RelayObserver: Send + Sync {
    fn notify(&self, event: &RelayEvent);
}

/// Default observer: discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpObserver;

impl RelayObserver for NoOpObserver {
    fn notify(&self, _event: &RelayEvent) {}
}

/// Observer logging each event through `tracing` with the idempotency key
/// as a structured field.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl RelayObserver for TracingObserver {
    fn notify(&self, event: &RelayEvent) {
        match event {
            RelayEvent::Received { key, source } => {
                tracing::debug!(key = %key, source = %source, "message received");
            }
            RelayEvent::TransformStarted { key, attempt } => {
                tracing::debug!(key = %key, attempt, "transform started");
            }
            RelayEvent::TransformCompleted { key, disposition } => {
                tracing::debug!(key = %key, ?disposition, "transform completed");
            }
            RelayEvent::SendStarted { key, attempt } => {
                tracing::debug!(key = %key, attempt, "send started");
            }
            RelayEvent::SendCompleted { key, result } => match result {
                Ok(receipt) => tracing::debug!(key = %key, receipt = %receipt, "send succeeded"),
                Err(cause) => tracing::warn!(key = %key, cause = %cause, "send failed"),
            },
            RelayEvent::JournalCommitted { key, state } => {
                tracing::info!(key = %key, state = %state, "journal committed");
            }
        }
    }
}

/// Observer counting lifecycle outcomes with atomic counters.
#[derive(Debug, Default)]
pub struct MetricsObserver {
    received: AtomicU64,
    delivered: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    retrying: AtomicU64,
    send_failures: AtomicU64,
}

impl MetricsObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consistent-enough point-in-time copy of the counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retrying: self.retrying.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
        }
    }
}

impl RelayObserver for MetricsObserver {
    fn notify(&self, event: &RelayEvent) {
        match event {
            RelayEvent::Received { .. } => {
                self.received.fetch_add(1, Ordering::Relaxed);
            }
            RelayEvent::SendCompleted { result: Err(_), .. } => {
                self.send_failures.fetch_add(1, Ordering::Relaxed);
            }
            RelayEvent::JournalCommitted { state, .. } => {
                let counter = match state {
                    RelayState::Delivered => &self.delivered,
                    RelayState::Skipped => &self.skipped,
                    RelayState::Failed => &self.failed,
                    RelayState::Retrying => &self.retrying,
                    RelayState::Received => return,
                };
                counter.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }
}

/// Point-in-time view of relay counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub received: u64,
    pub delivered: u64,
    pub skipped: u64,
    pub failed: u64,
    pub retrying: u64,
    pub send_failures: u64,
}

impl MetricsSnapshot {
    /// Delivered fraction of messages received (0.0 when nothing received).
    pub fn delivery_rate(&self) -> f64 {
        if self.received == 0 {
            0.0
        } else {
            self.delivered as f64 / self.received as f64
        }
    }
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "received: {}, delivered: {}, skipped: {}, failed: {}, retrying: {}",
            self.received, self.delivered, self.skipped, self.failed, self.retrying
        )
    }
}
