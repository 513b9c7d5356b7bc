//! # Connector Journal - Exactly-Once Relay Bookkeeping
//!
//! ## Purpose
//! Durable record of every relay attempt, keyed by idempotency key. The
//! [`Journal`] service enforces the relay state machine on top of any
//! [`connector_core::JournalStore`]; [`MemoryJournalStore`] is the bundled
//! store for single-process deployments and tests.
//!
//! ## Correctness Argument
//! All shared mutable state of the relay engine lives here. The store's
//! `insert_or_fetch` and `transition` are atomic per key, so concurrent
//! attempts for the same key serialize on the record and a record's state
//! only ever advances forward. Terminal states short-circuit replays: the
//! engine returns the stored outcome without transforming or sending again.

pub mod journal;
pub mod store;

pub use journal::Journal;
pub use store::MemoryJournalStore;
