//! Typed failure model for retryable job processing.
//!
//! A job handler that hits a transient condition (most commonly: the ledger
//! record it was dispatched for is not visible yet) raises a
//! [`RetryableFailure`] instead of a generic error. The closed [`FailureKind`]
//! enumeration is what lets the queue distinguish "retry me" from "this job is
//! broken" without inspecting error strings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification tag for a retryable failure.
///
/// Closed enumeration: an unrecognized kind is unrepresentable, so
/// classification stays a total function. Conditions that are *not* covered
/// by a variant here must not be wrapped in a [`RetryableFailure`] at all —
/// they belong to the generic, non-retryable error class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The referenced entity is expected to exist but has not become visible
    /// yet (replication/commit lag on the upstream ledger).
    EntityNotFoundYet,
    /// The upstream declared itself temporarily unavailable.
    UpstreamUnavailable,
    /// A lock or version conflict that clears on re-execution.
    LockConflict,
}

impl FailureKind {
    /// Whether this kind is recovered locally by retry-with-backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            FailureKind::EntityNotFoundYet => true,
            FailureKind::UpstreamUnavailable => true,
            FailureKind::LockConflict => true,
        }
    }

    /// Stable label for logs/metrics aggregation.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::EntityNotFoundYet => "entity_not_found_yet",
            FailureKind::UpstreamUnavailable => "upstream_unavailable",
            FailureKind::LockConflict => "lock_conflict",
        }
    }
}

impl core::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Construction-time rejection of a malformed failure.
///
/// Raised only for programming/integration errors; never during
/// classification.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MalformedFailure {
    /// The correlation key was empty or whitespace-only.
    #[error("correlation key must not be empty")]
    EmptyCorrelationKey,

    /// The source event name was empty or whitespace-only.
    #[error("source event must not be empty")]
    EmptySourceEvent,
}

/// A transient job failure that warrants a retry.
///
/// Immutable once constructed (accessors only, no mutators) and free of
/// retry-count state — how many attempts have happened is the queue's
/// business, this value only signals *that* a retry is warranted.
///
/// The structured fields are exposed individually so observability sinks can
/// aggregate by kind or source event without parsing the formatted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryableFailure {
    kind: FailureKind,
    correlation_key: String,
    source_event: String,
}

impl RetryableFailure {
    /// Construct a failure, rejecting empty fields immediately.
    ///
    /// The correlation key must be stable across retries of the same logical
    /// job; the source event names the webhook/event that dispatched it.
    pub fn new(
        kind: FailureKind,
        correlation_key: impl Into<String>,
        source_event: impl Into<String>,
    ) -> Result<Self, MalformedFailure> {
        let correlation_key = correlation_key.into();
        let source_event = source_event.into();

        if correlation_key.trim().is_empty() {
            return Err(MalformedFailure::EmptyCorrelationKey);
        }
        if source_event.trim().is_empty() {
            return Err(MalformedFailure::EmptySourceEvent);
        }

        Ok(Self {
            kind,
            correlation_key,
            source_event,
        })
    }

    /// Shorthand for the common case: the looked-up entity is not visible yet.
    pub fn entity_not_found_yet(
        correlation_key: impl Into<String>,
        source_event: impl Into<String>,
    ) -> Result<Self, MalformedFailure> {
        Self::new(FailureKind::EntityNotFoundYet, correlation_key, source_event)
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    /// Business identifier of the entity the job depends on.
    pub fn correlation_key(&self) -> &str {
        &self.correlation_key
    }

    /// Name of the event/webhook that dispatched the job.
    pub fn source_event(&self) -> &str {
        &self.source_event
    }

    /// Human-readable message, derived deterministically from the fields.
    pub fn message(&self) -> String {
        match self.kind {
            FailureKind::EntityNotFoundYet => format!(
                "Entity not found for {} (Event: {}). Will retry.",
                self.correlation_key, self.source_event
            ),
            FailureKind::UpstreamUnavailable => format!(
                "Upstream unavailable for {} (Event: {}). Will retry.",
                self.correlation_key, self.source_event
            ),
            FailureKind::LockConflict => format!(
                "Lock conflict for {} (Event: {}). Will retry.",
                self.correlation_key, self.source_event
            ),
        }
    }
}

impl core::fmt::Display for RetryableFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for RetryableFailure {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn message_format_is_exact() {
        let failure =
            RetryableFailure::entity_not_found_yet("TX-001", "payment.confirmed").unwrap();

        assert_eq!(
            failure.message(),
            "Entity not found for TX-001 (Event: payment.confirmed). Will retry."
        );
        assert_eq!(failure.to_string(), failure.message());
    }

    #[test]
    fn fields_are_exposed_individually() {
        let failure =
            RetryableFailure::new(FailureKind::LockConflict, "TX-002", "payment.settled").unwrap();

        assert_eq!(failure.kind(), FailureKind::LockConflict);
        assert_eq!(failure.correlation_key(), "TX-002");
        assert_eq!(failure.source_event(), "payment.settled");
    }

    #[test]
    fn empty_correlation_key_is_rejected() {
        let err = RetryableFailure::entity_not_found_yet("", "payment.confirmed").unwrap_err();
        assert_eq!(err, MalformedFailure::EmptyCorrelationKey);

        let err = RetryableFailure::entity_not_found_yet("   ", "payment.confirmed").unwrap_err();
        assert_eq!(err, MalformedFailure::EmptyCorrelationKey);
    }

    #[test]
    fn empty_source_event_is_rejected() {
        let err = RetryableFailure::entity_not_found_yet("TX-001", "").unwrap_err();
        assert_eq!(err, MalformedFailure::EmptySourceEvent);

        let err = RetryableFailure::entity_not_found_yet("TX-001", "\t\n").unwrap_err();
        assert_eq!(err, MalformedFailure::EmptySourceEvent);
    }

    #[test]
    fn every_kind_is_transient() {
        for kind in [
            FailureKind::EntityNotFoundYet,
            FailureKind::UpstreamUnavailable,
            FailureKind::LockConflict,
        ] {
            assert!(kind.is_transient(), "{kind} must be transient");
        }
    }

    proptest! {
        #[test]
        fn construction_succeeds_for_non_empty_fields(
            key in "[A-Za-z0-9._:-]{1,40}",
            event in "[a-z]{1,12}\\.[a-z]{1,12}",
        ) {
            let failure = RetryableFailure::entity_not_found_yet(&key, &event).unwrap();
            let message = failure.message();

            prop_assert_eq!(
                message.clone(),
                format!("Entity not found for {key} (Event: {event}). Will retry.")
            );
            prop_assert!(message.contains(&key));
            prop_assert!(message.contains(&event));
        }
    }
}
