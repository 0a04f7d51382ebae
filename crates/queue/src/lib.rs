//! Job queue with typed retry classification and dead-letter handling.
//!
//! ## Design
//!
//! - Jobs are dispatched by inbound events/webhooks and carry the correlation
//!   key of the ledger entity they depend on
//! - Handlers raise a typed `RetryableFailure` when the entity is not visible
//!   yet; the classifier decides retry-with-backoff vs dead-letter
//! - Attempt counts live on the job, owned by the queue, never on the failure
//! - Dead-letter entries preserve correlation key, source event, and message
//!   for operator triage
//! - Cancellation by correlation key removes jobs from the retry schedule
//!
//! ## Components
//!
//! - `Job`: unit of asynchronous work with payload and state machine
//! - `JobStore`: persistence for jobs (in-memory reference implementation)
//! - `Worker`: polls the store, runs handlers, consults the classifier

pub mod store;
pub mod types;
pub mod worker;

pub use store::{InMemoryJobStore, JobStats, JobStore, JobStoreError};
pub use types::{DeadLetterEntry, Job, JobAttemptRecord, JobError, JobId, JobStatus};
pub use worker::{Worker, WorkerConfig, WorkerHandle, WorkerStats};

#[cfg(test)]
mod integration_tests;
