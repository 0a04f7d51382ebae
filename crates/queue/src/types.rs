//! Core job types and the job state machine.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ledgerq_core::{FailureKind, RetryableFailure};

/// Unique job identifier.
///
/// Job-unique, not entity-unique: one ledger entity may be referenced by many
/// distinct jobs over time, so this is never the correlation key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job execution status.
///
/// Terminal states (`Succeeded`, `DeadLettered`, `Cancelled`) absorb: the
/// `mark_*` transitions on [`Job`] refuse to leave them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, waiting to be picked up
    Pending,
    /// Currently being executed by a worker
    Processing,
    /// Completed successfully
    Succeeded,
    /// Transient failure; scheduled for another attempt after backoff
    AwaitingRetry { kind: FailureKind, attempt: u32 },
    /// Exhausted retries or hit a fatal error; routed to the dead-letter sink
    DeadLettered { reason: String, attempts: u32 },
    /// Actively removed from the schedule (e.g. a cancellation event arrived
    /// for the same correlation key)
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::DeadLettered { .. } | JobStatus::Cancelled
        )
    }

    pub fn is_retriable(&self) -> bool {
        matches!(self, JobStatus::AwaitingRetry { .. })
    }
}

/// What a handler returns when a job cannot complete.
///
/// The split is the whole point: a typed [`RetryableFailure`] means "the
/// condition clears on its own, retry me"; anything else is `Fatal` and goes
/// straight to the dead-letter sink. A generic lookup error (network failure,
/// bad payload) must never be wrapped as `Retryable`.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Retryable(#[from] RetryableFailure),

    #[error("{0}")]
    Fatal(String),
}

impl JobError {
    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }
}

/// A unit of asynchronous work dispatched by an inbound event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,
    /// Name of the event/webhook that dispatched this job
    pub source_event: String,
    /// Business identifier of the entity the job depends on
    pub correlation_key: String,
    /// JSON payload
    pub payload: serde_json::Value,
    /// Current status
    pub status: JobStatus,
    /// Attempts already made (owned by the queue, persisted across retries)
    pub attempt: u32,
    /// When the job was created
    pub created_at: DateTime<Utc>,
    /// When the job was last updated
    pub updated_at: DateTime<Utc>,
    /// Earliest time the next attempt may run (backoff)
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Outcome of previous attempts
    pub history: Vec<JobAttemptRecord>,
}

/// Record of a single execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAttemptRecord {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(
        source_event: impl Into<String>,
        correlation_key: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            source_event: source_event.into(),
            correlation_key: correlation_key.into(),
            payload,
            status: JobStatus::Pending,
            attempt: 0,
            created_at: now,
            updated_at: now,
            scheduled_at: None,
            history: Vec::new(),
        }
    }

    /// Check if the job is ready to execute (backoff elapsed).
    pub fn is_ready(&self) -> bool {
        match self.scheduled_at {
            Some(at) => Utc::now() >= at,
            None => true,
        }
    }

    /// Begin an attempt: `Pending`/`AwaitingRetry` -> `Processing`.
    pub fn mark_processing(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = JobStatus::Processing;
        self.attempt += 1;
        self.updated_at = Utc::now();
    }

    /// `Processing` -> `Succeeded`.
    pub fn mark_succeeded(&mut self, started_at: DateTime<Utc>) {
        if self.status.is_terminal() {
            return;
        }
        let now = Utc::now();
        self.status = JobStatus::Succeeded;
        self.scheduled_at = None;
        self.updated_at = now;
        self.history.push(JobAttemptRecord {
            attempt: self.attempt,
            started_at,
            finished_at: now,
            success: true,
            error: None,
        });
    }

    /// `Processing` -> `AwaitingRetry`, with the next attempt gated on
    /// `delay`.
    pub fn mark_awaiting_retry(
        &mut self,
        kind: FailureKind,
        delay: Duration,
        started_at: DateTime<Utc>,
        error: String,
    ) {
        if self.status.is_terminal() {
            return;
        }
        let now = Utc::now();
        self.status = JobStatus::AwaitingRetry {
            kind,
            attempt: self.attempt,
        };
        self.scheduled_at = Some(now + chrono::Duration::from_std(delay).unwrap_or_default());
        self.updated_at = now;
        self.history.push(JobAttemptRecord {
            attempt: self.attempt,
            started_at,
            finished_at: now,
            success: false,
            error: Some(error),
        });
    }

    /// `Processing` -> `DeadLettered`.
    pub fn mark_dead_lettered(&mut self, reason: String, started_at: DateTime<Utc>) {
        if self.status.is_terminal() {
            return;
        }
        let now = Utc::now();
        self.updated_at = now;
        self.history.push(JobAttemptRecord {
            attempt: self.attempt,
            started_at,
            finished_at: now,
            success: false,
            error: Some(reason.clone()),
        });
        self.status = JobStatus::DeadLettered {
            reason,
            attempts: self.attempt,
        };
        self.scheduled_at = None;
    }

    /// Remove the job from the schedule.
    pub fn mark_cancelled(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = JobStatus::Cancelled;
        self.scheduled_at = None;
        self.updated_at = Utc::now();
    }
}

/// Entry in the dead-letter sink.
///
/// Preserves the correlation key, source event, and failure message so an
/// operator can triage without touching the original payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub job: Job,
    pub dead_lettered_at: DateTime<Utc>,
    pub reason: String,
}

impl DeadLetterEntry {
    pub fn new(job: Job, reason: String) -> Self {
        Self {
            job,
            dead_lettered_at: Utc::now(),
            reason,
        }
    }

    pub fn correlation_key(&self) -> &str {
        &self.job.correlation_key
    }

    pub fn source_event(&self) -> &str {
        &self.job.source_event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_job() -> Job {
        Job::new("payment.confirmed", "TX-001", serde_json::json!({}))
    }

    #[test]
    fn new_job_is_pending_and_ready() {
        let job = test_job();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempt, 0);
        assert!(job.is_ready());
    }

    #[test]
    fn processing_increments_attempt() {
        let mut job = test_job();
        job.mark_processing();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.attempt, 1);

        job.mark_awaiting_retry(
            FailureKind::EntityNotFoundYet,
            Duration::from_secs(2),
            Utc::now(),
            "not yet".into(),
        );
        job.mark_processing();
        assert_eq!(job.attempt, 2);
    }

    #[test]
    fn awaiting_retry_gates_on_backoff() {
        let mut job = test_job();
        job.mark_processing();
        let started = Utc::now();
        job.mark_awaiting_retry(
            FailureKind::EntityNotFoundYet,
            Duration::from_secs(30),
            started,
            "not yet".into(),
        );

        assert!(job.status.is_retriable());
        assert!(!job.is_ready());
        assert_eq!(job.history.len(), 1);
        assert!(!job.history[0].success);
    }

    #[test]
    fn terminal_states_absorb() {
        let mut job = test_job();
        job.mark_processing();
        job.mark_succeeded(Utc::now());
        assert!(job.status.is_terminal());

        job.mark_processing();
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.attempt, 1);

        job.mark_cancelled();
        assert_eq!(job.status, JobStatus::Succeeded);

        let mut dead = test_job();
        dead.mark_processing();
        dead.mark_dead_lettered("gone".into(), Utc::now());
        dead.mark_processing();
        assert!(matches!(dead.status, JobStatus::DeadLettered { .. }));
    }

    #[test]
    fn dead_letter_entry_exposes_triage_fields() {
        let mut job = test_job();
        job.mark_processing();
        job.mark_dead_lettered("retry budget exhausted".into(), Utc::now());

        let entry = DeadLetterEntry::new(job, "retry budget exhausted".into());
        assert_eq!(entry.correlation_key(), "TX-001");
        assert_eq!(entry.source_event(), "payment.confirmed");
    }

    #[test]
    fn retryable_failure_converts_into_job_error() {
        let failure =
            RetryableFailure::entity_not_found_yet("TX-001", "payment.confirmed").unwrap();
        let err: JobError = failure.clone().into();
        assert!(matches!(err, JobError::Retryable(f) if f == failure));
    }
}
