//! Test doubles for the transport and journal SPIs.
//!
//! Used by the engine's own tests and available to adapter crates writing
//! relay-level tests.

use async_trait::async_trait;
use connector_core::{
    BeginOutcome, ConnectorError, FailureCause, IdempotencyKey, InboundReceiver, JournalError,
    JournalRecord, JournalStore, Message, OutboundResult, OutboundSender, RecordPatch, RelayState,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

/// Sender that records every message and acknowledges with a sequential
/// receipt.
#[derive(Debug, Default)]
pub struct CollectorSender {
    messages: Mutex<Vec<Message>>,
    send_count: AtomicU64,
}

impl CollectorSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_messages(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }

    /// Total number of `send` invocations, including failed ones.
    pub fn send_count(&self) -> u64 {
        self.send_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl OutboundSender for CollectorSender {
    async fn send(&self, message: &Message) -> Result<OutboundResult, FailureCause> {
        let count = self.send_count.fetch_add(1, Ordering::Relaxed) + 1;
        self.messages.lock().unwrap().push(message.clone());
        Ok(OutboundResult::new(format!("receipt-{}", count)))
    }
}

/// Sender that always fails with the configured cause.
#[derive(Debug)]
pub struct FailingSender {
    cause: FailureCause,
    send_count: AtomicU64,
}

impl FailingSender {
    pub fn new(cause: FailureCause) -> Self {
        Self {
            cause,
            send_count: AtomicU64::new(0),
        }
    }

    pub fn send_count(&self) -> u64 {
        self.send_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl OutboundSender for FailingSender {
    async fn send(&self, _message: &Message) -> Result<OutboundResult, FailureCause> {
        self.send_count.fetch_add(1, Ordering::Relaxed);
        Err(self.cause.clone())
    }
}

/// Sender that fails a scripted number of times, then succeeds.
#[derive(Debug)]
pub struct FlakySender {
    failures_remaining: AtomicU32,
    cause: FailureCause,
    send_count: AtomicU64,
}

impl FlakySender {
    pub fn new(failures: u32, cause: FailureCause) -> Self {
        Self {
            failures_remaining: AtomicU32::new(failures),
            cause,
            send_count: AtomicU64::new(0),
        }
    }

    pub fn send_count(&self) -> u64 {
        self.send_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl OutboundSender for FlakySender {
    async fn send(&self, _message: &Message) -> Result<OutboundResult, FailureCause> {
        let count = self.send_count.fetch_add(1, Ordering::Relaxed) + 1;
        let claimed_failure = self
            .failures_remaining
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if claimed_failure {
            return Err(self.cause.clone());
        }
        Ok(OutboundResult::new(format!("receipt-{}", count)))
    }
}

/// Sender that sleeps before acknowledging, for timeout and concurrency
/// tests.
#[derive(Debug)]
pub struct SlowSender {
    delay_ms: u64,
    send_count: AtomicU64,
}

impl SlowSender {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            send_count: AtomicU64::new(0),
        }
    }

    pub fn send_count(&self) -> u64 {
        self.send_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl OutboundSender for SlowSender {
    async fn send(&self, _message: &Message) -> Result<OutboundResult, FailureCause> {
        self.send_count.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        Ok(OutboundResult::new("slow-receipt"))
    }
}

/// Receiver yielding a fixed sequence of messages.
#[derive(Debug, Default)]
pub struct VecReceiver {
    queue: VecDeque<Message>,
}

impl VecReceiver {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            queue: messages.into(),
        }
    }
}

#[async_trait]
impl InboundReceiver for VecReceiver {
    async fn receive(&mut self) -> Result<Option<Message>, ConnectorError> {
        Ok(self.queue.pop_front())
    }
}

/// Journal store that is always unavailable.
#[derive(Debug, Default)]
pub struct UnavailableStore;

#[async_trait]
impl JournalStore for UnavailableStore {
    async fn insert_or_fetch(&self, _record: JournalRecord) -> Result<BeginOutcome, JournalError> {
        Err(JournalError::Unavailable("store offline".to_string()))
    }

    async fn transition(
        &self,
        _key: &IdempotencyKey,
        _allowed_from: &[RelayState],
        _patch: RecordPatch,
    ) -> Result<JournalRecord, JournalError> {
        Err(JournalError::Unavailable("store offline".to_string()))
    }

    async fn load(&self, _key: &IdempotencyKey) -> Result<Option<JournalRecord>, JournalError> {
        Err(JournalError::Unavailable("store offline".to_string()))
    }
}
