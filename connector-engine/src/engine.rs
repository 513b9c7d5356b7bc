//! Relay engine: one call per attempt, journal as the source of truth.

use connector_core::{
    BeginOutcome, ConnectorError, FailureCause, IdempotencyKey, JournalError, JournalRecord,
    JournalStore, Message, NoOpObserver, OutboundResult, OutboundSender, RelayConfig, RelayEvent,
    RelayObserver, RelayState, TransformDisposition,
};
use connector_journal::Journal;
use connector_transformation::{PipelineOutcome, TransformContext, TransformPipeline};
use rand::Rng;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};

/// Poll interval while following a concurrent attempt for the same key.
const IN_FLIGHT_POLL: Duration = Duration::from_millis(10);

/// Outcome of one `relay` call.
///
/// `Retrying` asks the caller to resubmit the same message later; every
/// other variant is final for the idempotency key.
#[derive(Debug, Clone)]
pub enum RelayOutcome {
    /// Sent and committed; carries the sender's receipt.
    Delivered(OutboundResult),
    /// Intentionally discarded by a transformer.
    Skipped,
    /// Terminally failed; no further attempt will run.
    Failed(FailureCause),
    /// Attempt failed retriably; resubmit to run attempt `attempts`.
    Retrying { attempts: u32, cause: FailureCause },
}

impl RelayOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RelayOutcome::Retrying { .. })
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, RelayOutcome::Delivered(_))
    }
}

/// How taking over a stuck `RECEIVED` record resolved.
enum ClaimOutcome {
    /// This caller won the claim; run the attempt with the record.
    Claimed(JournalRecord),
    /// The record resolved without this caller attempting.
    Resolved(RelayOutcome),
}

/// Stateless orchestrator of relay attempts.
///
/// Safe for concurrent invocation; all shared mutable state lives in the
/// journal store.
pub struct RelayEngine {
    journal: Journal,
    pipeline: TransformPipeline,
    sender: Arc<dyn OutboundSender>,
    observer: Arc<dyn RelayObserver>,
    config: RelayConfig,
}

impl RelayEngine {
    pub fn new(
        store: Arc<dyn JournalStore>,
        pipeline: TransformPipeline,
        sender: Arc<dyn OutboundSender>,
        config: RelayConfig,
    ) -> Self {
        let journal = Journal::new(store, config.max_attempts);
        Self {
            journal,
            pipeline,
            sender,
            observer: Arc::new(NoOpObserver),
            config,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RelayObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Run one relay attempt for the message.
    ///
    /// Returns a fault only for structural problems (`InvalidMessage`,
    /// `InvalidTransition`); every recoverable condition is absorbed into
    /// one of the four outcomes.
    pub async fn relay(&self, message: Message) -> Result<RelayOutcome, ConnectorError> {
        let key = IdempotencyKey::derive(&message);
        self.notify(RelayEvent::Received {
            key: key.clone(),
            source: message.source().to_string(),
        });

        let begin = match self.journal.begin_or_resume(&key).await {
            Ok(outcome) => outcome,
            Err(JournalError::Unavailable(detail)) => {
                tracing::warn!(key = %key, detail = %detail, "journal unavailable at begin");
                return Ok(RelayOutcome::Retrying {
                    attempts: 0,
                    cause: FailureCause::journal_unavailable(detail),
                });
            }
            Err(err) => return Err(err.into()),
        };

        let record = match begin {
            BeginOutcome::Created(record) => record,
            BeginOutcome::Resumed(record) => {
                if let Some(outcome) = stored_outcome(&record) {
                    // Exactly-once short-circuit: no transform, no send.
                    tracing::debug!(key = %key, state = %record.state, "resumed terminal record");
                    return Ok(outcome);
                }
                match record.state {
                    RelayState::Retrying if record.attempt_count > self.config.max_attempts => {
                        // Only reachable when max_attempts shrank between runs.
                        let cause = FailureCause::other(format!(
                            "retry attempts exhausted after {}",
                            record.attempt_count
                        ));
                        return self.commit_failure(&key, cause, false).await;
                    }
                    RelayState::Retrying => record,
                    _ => {
                        // RECEIVED: another attempt is in flight for this key.
                        match self.follow_in_flight(&key).await? {
                            Some(outcome) => return Ok(outcome),
                            // No movement within the send timeout: the prior
                            // attempt is presumed dead. The record must be
                            // claimed with a guarded transition before this
                            // caller may run an attempt of its own.
                            None => match self.claim_abandoned(&key).await? {
                                ClaimOutcome::Claimed(record) => record,
                                ClaimOutcome::Resolved(outcome) => return Ok(outcome),
                            },
                        }
                    }
                }
            }
        };

        self.attempt(&key, &record, message).await
    }

    /// Steps 4-6: transform, send under timeout, commit.
    async fn attempt(
        &self,
        key: &IdempotencyKey,
        record: &JournalRecord,
        message: Message,
    ) -> Result<RelayOutcome, ConnectorError> {
        let attempt = record.attempt_count;
        let mut ctx = TransformContext::new(key.clone(), attempt);
        self.notify(RelayEvent::TransformStarted {
            key: key.clone(),
            attempt,
        });

        let transformed = match self.pipeline.apply(message, &mut ctx) {
            PipelineOutcome::Transformed(message) => {
                self.notify(RelayEvent::TransformCompleted {
                    key: key.clone(),
                    disposition: TransformDisposition::Continue,
                });
                message
            }
            PipelineOutcome::Dropped { stage } => {
                self.notify(RelayEvent::TransformCompleted {
                    key: key.clone(),
                    disposition: TransformDisposition::Dropped,
                });
                tracing::debug!(key = %key, stage = %stage, "message dropped");
                return self.commit_skipped(key, record.state).await;
            }
            PipelineOutcome::Failed { stage, cause } => {
                self.notify(RelayEvent::TransformCompleted {
                    key: key.clone(),
                    disposition: TransformDisposition::Failed,
                });
                let cause = FailureCause::new(cause.kind, format!("{}: {}", stage, cause.detail));
                let retriable = self.config.retry.is_retriable(cause.kind);
                return self.commit_failure(key, cause, retriable).await;
            }
        };

        self.notify(RelayEvent::SendStarted {
            key: key.clone(),
            attempt,
        });
        let send_result = match timeout(self.config.send_timeout(), self.sender.send(&transformed))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(FailureCause::timeout(format!(
                "send exceeded {}ms",
                self.config.send_timeout_ms
            ))),
        };

        match send_result {
            Ok(result) => {
                self.notify(RelayEvent::SendCompleted {
                    key: key.clone(),
                    result: Ok(result.receipt.clone()),
                });
                match self.journal.mark_delivered(key, result.clone()).await {
                    Ok(record) => {
                        self.notify(RelayEvent::JournalCommitted {
                            key: key.clone(),
                            state: record.state,
                        });
                        Ok(RelayOutcome::Delivered(result))
                    }
                    Err(JournalError::Unavailable(detail)) => {
                        tracing::warn!(key = %key, detail = %detail, "journal unavailable at delivery commit");
                        Ok(RelayOutcome::Retrying {
                            attempts: attempt,
                            cause: FailureCause::journal_unavailable(detail),
                        })
                    }
                    Err(JournalError::InvalidTransition { .. }) => {
                        // A concurrent attempt closed the record first; its
                        // commit is authoritative.
                        tracing::warn!(key = %key, "delivery commit lost to a concurrent attempt");
                        self.resolve_conflict(key).await
                    }
                    Err(err) => Err(err.into()),
                }
            }
            Err(cause) => {
                self.notify(RelayEvent::SendCompleted {
                    key: key.clone(),
                    result: Err(cause.clone()),
                });
                let retriable = self.config.retry.is_retriable(cause.kind);
                self.commit_failure(key, cause, retriable).await
            }
        }
    }

    /// Commit a failed attempt and translate the journal's decision into an
    /// outcome. The backoff delay runs after the commit, never inside it.
    async fn commit_failure(
        &self,
        key: &IdempotencyKey,
        cause: FailureCause,
        retriable: bool,
    ) -> Result<RelayOutcome, ConnectorError> {
        let record = match self.journal.mark_failed(key, cause.clone(), retriable).await {
            Ok(record) => record,
            Err(JournalError::Unavailable(detail)) => {
                tracing::warn!(key = %key, detail = %detail, "journal unavailable at failure commit");
                return Ok(RelayOutcome::Retrying {
                    attempts: 0,
                    cause: FailureCause::journal_unavailable(detail),
                });
            }
            Err(JournalError::InvalidTransition { .. }) => {
                tracing::warn!(key = %key, "failure commit lost to a concurrent attempt");
                return self.resolve_conflict(key).await;
            }
            Err(err) => return Err(err.into()),
        };
        self.notify(RelayEvent::JournalCommitted {
            key: key.clone(),
            state: record.state,
        });

        if record.state == RelayState::Retrying {
            sleep(self.backoff_delay(record.attempt_count)).await;
            Ok(RelayOutcome::Retrying {
                attempts: record.attempt_count,
                cause,
            })
        } else {
            Ok(RelayOutcome::Failed(cause))
        }
    }

    /// Commit a transformer-signaled drop.
    ///
    /// `SKIPPED` is unreachable from `RETRYING`, so a drop on a retry
    /// closes the record as a terminal failure and the caller observes
    /// `Failed`; every replay of the key then resolves to that same
    /// outcome.
    async fn commit_skipped(
        &self,
        key: &IdempotencyKey,
        from_state: RelayState,
    ) -> Result<RelayOutcome, ConnectorError> {
        if from_state == RelayState::Retrying {
            let cause = FailureCause::other("message dropped by transformer during retry");
            return self.commit_failure(key, cause, false).await;
        }

        match self.journal.mark_skipped(key).await {
            Ok(record) => {
                self.notify(RelayEvent::JournalCommitted {
                    key: key.clone(),
                    state: record.state,
                });
                Ok(RelayOutcome::Skipped)
            }
            Err(JournalError::Unavailable(detail)) => {
                tracing::warn!(key = %key, detail = %detail, "journal unavailable at skip commit");
                Ok(RelayOutcome::Retrying {
                    attempts: 0,
                    cause: FailureCause::journal_unavailable(detail),
                })
            }
            Err(JournalError::InvalidTransition { .. }) => {
                tracing::warn!(key = %key, "skip commit lost to a concurrent attempt");
                self.resolve_conflict(key).await
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Claim a record stuck in `RECEIVED` after following it produced no
    /// movement. The guarded transition charges the abandoned attempt
    /// against the budget; only one follower can win it.
    async fn claim_abandoned(
        &self,
        key: &IdempotencyKey,
    ) -> Result<ClaimOutcome, ConnectorError> {
        let cause = FailureCause::other("attempt abandoned without a journal commit");
        match self.journal.claim_abandoned(key, cause).await {
            Ok(record) if record.state == RelayState::Retrying => {
                Ok(ClaimOutcome::Claimed(record))
            }
            // Budget already spent; the claim closed the record.
            Ok(record) => {
                self.notify(RelayEvent::JournalCommitted {
                    key: key.clone(),
                    state: record.state,
                });
                let cause = record
                    .last_error
                    .unwrap_or_else(|| FailureCause::other("retry attempts exhausted"));
                Ok(ClaimOutcome::Resolved(RelayOutcome::Failed(cause)))
            }
            // The record moved after all: another follower claimed it, or
            // the original attempt committed late.
            Err(JournalError::InvalidTransition { .. }) => {
                Ok(ClaimOutcome::Resolved(self.resolve_conflict(key).await?))
            }
            Err(JournalError::Unavailable(detail)) => {
                Ok(ClaimOutcome::Resolved(RelayOutcome::Retrying {
                    attempts: 0,
                    cause: FailureCause::journal_unavailable(detail),
                }))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// A commit lost the race with a concurrent attempt; re-read the record
    /// and return whatever it settled on.
    async fn resolve_conflict(
        &self,
        key: &IdempotencyKey,
    ) -> Result<RelayOutcome, ConnectorError> {
        match self.journal.load(key).await {
            Ok(Some(record)) => Ok(stored_outcome(&record).unwrap_or_else(|| {
                RelayOutcome::Retrying {
                    attempts: record.attempt_count,
                    cause: record
                        .last_error
                        .clone()
                        .unwrap_or_else(|| FailureCause::other("concurrent attempt in progress")),
                }
            })),
            Ok(None) => Err(JournalError::NotFound(key.clone()).into()),
            Err(JournalError::Unavailable(detail)) => Ok(RelayOutcome::Retrying {
                attempts: 0,
                cause: FailureCause::journal_unavailable(detail),
            }),
            Err(err) => Err(err.into()),
        }
    }

    /// Follow a concurrent attempt's record until it leaves `RECEIVED`.
    ///
    /// Returns `None` when the record does not move within the send
    /// timeout, which means the prior attempt is presumed dead and the
    /// caller may take the record over.
    async fn follow_in_flight(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<RelayOutcome>, ConnectorError> {
        let deadline = Instant::now() + self.config.send_timeout();
        loop {
            let record = match self.journal.load(key).await {
                Ok(Some(record)) => record,
                Ok(None) => return Ok(None),
                Err(JournalError::Unavailable(detail)) => {
                    return Ok(Some(RelayOutcome::Retrying {
                        attempts: 0,
                        cause: FailureCause::journal_unavailable(detail),
                    }));
                }
                Err(err) => return Err(err.into()),
            };

            if let Some(outcome) = stored_outcome(&record) {
                return Ok(Some(outcome));
            }
            if record.state == RelayState::Retrying {
                return Ok(Some(RelayOutcome::Retrying {
                    attempts: record.attempt_count,
                    cause: record
                        .last_error
                        .unwrap_or_else(|| FailureCause::other("concurrent attempt retrying")),
                }));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            sleep(IN_FLIGHT_POLL).await;
        }
    }

    /// Exponential backoff with symmetric jitter, bounded by the configured
    /// maximum interval.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.backoff.delay_for_attempt(attempt);
        let jitter = self.config.backoff.jitter;
        if jitter <= f64::EPSILON {
            return base;
        }
        let factor = rand::thread_rng().gen_range(1.0 - jitter..=1.0 + jitter);
        base.mul_f64(factor)
    }

    /// Observers must never affect the relay outcome; a panicking observer
    /// is logged and ignored.
    fn notify(&self, event: RelayEvent) {
        if catch_unwind(AssertUnwindSafe(|| self.observer.notify(&event))).is_err() {
            tracing::warn!("relay observer panicked, event discarded");
        }
    }
}

/// Outcome stored in a terminal record, if the record is terminal.
fn stored_outcome(record: &JournalRecord) -> Option<RelayOutcome> {
    match record.state {
        RelayState::Delivered => Some(RelayOutcome::Delivered(
            record.outbound_result.clone().unwrap_or_default(),
        )),
        RelayState::Skipped => Some(RelayOutcome::Skipped),
        RelayState::Failed => Some(RelayOutcome::Failed(
            record
                .last_error
                .clone()
                .unwrap_or_else(|| FailureCause::other("failed with no recorded cause")),
        )),
        RelayState::Received | RelayState::Retrying => None,
    }
}
