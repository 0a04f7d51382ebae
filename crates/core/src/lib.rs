//! `ledgerq-core` — retry-classification domain primitives.
//!
//! This crate contains **pure domain** types (no queue or infrastructure
//! concerns): the typed failure a job handler raises when an
//! eventually-consistent lookup comes back empty, and the deterministic
//! classifier that turns such a failure into a scheduling decision.

pub mod classifier;
pub mod failure;

pub use classifier::{BackoffConfig, RetryClassifier, RetryDecision};
pub use failure::{FailureKind, MalformedFailure, RetryableFailure};
