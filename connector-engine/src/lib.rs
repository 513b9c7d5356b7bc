//! # Connector Engine - Exactly-Once Relay Orchestration
//!
//! ## Purpose
//! Orchestrates one relay attempt end to end:
//! receive → dedup-check → transform → send → journal-commit, with
//! configuration-driven retry classification and exponential backoff.
//!
//! ## Control Flow
//! ```text
//! relay(Message)
//!   ├─ derive idempotency key, journal begin_or_resume
//!   ├─ resumed terminal?  → stored outcome, no transform, no send
//!   ├─ resumed exhausted? → mark FAILED
//!   ├─ run transform pipeline (drop → SKIPPED, fail → classified)
//!   ├─ send under timeout  (success → DELIVERED, failure → classified)
//!   └─ backoff after a RETRYING commit, then return the outcome
//! ```
//!
//! The engine is stateless and safe for concurrent use; every piece of
//! shared mutable state lives in the journal. A `Retrying` outcome asks the
//! caller (or [`engine::RelayEngine::run`]) to resubmit the same message
//! later; the engine owns no timer of its own.

pub mod batch;
pub mod engine;
pub mod pump;
pub mod test_utils;

pub use batch::BatchReport;
pub use engine::{RelayEngine, RelayOutcome};
pub use pump::PumpSummary;
