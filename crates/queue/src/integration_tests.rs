//! End-to-end scenarios against a fake eventually-consistent ledger.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;

use ledgerq_core::{BackoffConfig, RetryClassifier, RetryableFailure};

use crate::store::{InMemoryJobStore, JobStore};
use crate::types::{Job, JobStatus};
use crate::worker::Worker;

/// Stand-in for the upstream transaction ledger: entries become visible only
/// once inserted, mimicking replication lag.
#[derive(Clone, Default)]
struct FakeLedger {
    visible: Arc<RwLock<HashSet<String>>>,
}

impl FakeLedger {
    fn new() -> Self {
        ledgerq_observability::init();
        Self::default()
    }

    fn insert(&self, key: &str) {
        self.visible.write().unwrap().insert(key.to_string());
    }

    fn contains(&self, key: &str) -> bool {
        self.visible.read().unwrap().contains(key)
    }
}

fn lookup_worker(
    store: Arc<InMemoryJobStore>,
    ledger: FakeLedger,
    config: BackoffConfig,
) -> Worker<Arc<InMemoryJobStore>> {
    let mut worker = Worker::new(store, RetryClassifier::new(config));
    worker.register_handler("payment.confirmed", move |job| {
        if ledger.contains(&job.correlation_key) {
            return Ok(());
        }
        let failure = RetryableFailure::entity_not_found_yet(
            job.correlation_key.clone(),
            job.source_event.clone(),
        )
        .expect("job fields are non-empty");
        Err(failure.into())
    });
    worker
}

/// Release a job from its backoff gate so the next claim picks it up.
fn skip_backoff(store: &Arc<InMemoryJobStore>, job: &Job) {
    let mut stored = store.get(job.id).unwrap().unwrap();
    stored.scheduled_at = None;
    store.update(&stored).unwrap();
}

#[test]
fn first_failed_attempt_schedules_retry_with_base_delay() {
    let store = InMemoryJobStore::arc();
    let ledger = FakeLedger::new();
    let worker = lookup_worker(store.clone(), ledger, BackoffConfig::default());

    let job = Job::new("payment.confirmed", "TX-001", serde_json::json!({}));
    let job_id = store.enqueue(job).unwrap();

    let before = Utc::now();
    let mut claimed = store.claim_next().unwrap().unwrap();
    assert!(worker.execute_one(&mut claimed).is_err());

    let stored = store.get(job_id).unwrap().unwrap();
    assert!(
        matches!(stored.status, JobStatus::AwaitingRetry { attempt: 1, .. }),
        "unexpected status: {:?}",
        stored.status
    );

    // Base delay of 2s with the default config
    let scheduled = stored.scheduled_at.expect("backoff must be scheduled");
    let delay = (scheduled - before).num_milliseconds();
    assert!((1_500..=3_000).contains(&delay), "delay was {delay}ms");
}

#[test]
fn entity_never_appears_job_is_dead_lettered_on_attempt_five() {
    let store = InMemoryJobStore::arc();
    let ledger = FakeLedger::new();
    let worker = lookup_worker(store.clone(), ledger, BackoffConfig::default());

    let job = Job::new("payment.confirmed", "TX-001", serde_json::json!({}));
    let job_id = store.enqueue(job).unwrap();

    for attempt in 1..=5 {
        let mut claimed = store.claim_next().unwrap().unwrap();
        assert_eq!(claimed.attempt, attempt);
        assert!(worker.execute_one(&mut claimed).is_err());

        if !claimed.status.is_terminal() {
            skip_backoff(&store, &claimed);
        }
    }

    // Gone from the main queue, present in the dead-letter sink
    assert!(store.get(job_id).unwrap().is_none());

    let dls = store.list_dead_letters(10).unwrap();
    assert_eq!(dls.len(), 1);
    assert_eq!(dls[0].correlation_key(), "TX-001");
    assert_eq!(dls[0].source_event(), "payment.confirmed");
    assert!(matches!(
        dls[0].job.status,
        JobStatus::DeadLettered { attempts: 5, .. }
    ));
    assert!(dls[0].reason.contains("retry budget exhausted"));
    assert!(dls[0].reason.contains("TX-001"));
}

#[test]
fn entity_appears_before_second_attempt_job_succeeds() {
    let store = InMemoryJobStore::arc();
    let ledger = FakeLedger::new();
    let worker = lookup_worker(store.clone(), ledger.clone(), BackoffConfig::default());

    let job = Job::new("payment.confirmed", "TX-001", serde_json::json!({}));
    let job_id = store.enqueue(job).unwrap();

    // Attempt 1: not visible yet
    let mut claimed = store.claim_next().unwrap().unwrap();
    assert!(worker.execute_one(&mut claimed).is_err());

    // Replication catches up before the retry fires
    ledger.insert("TX-001");
    skip_backoff(&store, &claimed);

    // Attempt 2: succeeds, nothing raised
    let mut claimed = store.claim_next().unwrap().unwrap();
    assert_eq!(claimed.attempt, 2);
    assert!(worker.execute_one(&mut claimed).is_ok());

    let stored = store.get(job_id).unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Succeeded);
    assert!(store.list_dead_letters(10).unwrap().is_empty());
}

#[test]
fn cancellation_removes_awaiting_job_from_schedule() {
    let store = InMemoryJobStore::arc();
    let ledger = FakeLedger::new();
    let worker = lookup_worker(store.clone(), ledger, BackoffConfig::default());

    let job = Job::new("payment.confirmed", "TX-001", serde_json::json!({}));
    let job_id = store.enqueue(job).unwrap();

    let mut claimed = store.claim_next().unwrap().unwrap();
    assert!(worker.execute_one(&mut claimed).is_err());
    skip_backoff(&store, &claimed);

    // A cancellation event for the same correlation key arrives
    let cancelled = store.cancel_by_correlation("TX-001").unwrap();
    assert_eq!(cancelled, vec![job_id]);

    // The job never runs again and never exhausts its budget
    assert!(store.claim_next().unwrap().is_none());
    assert_eq!(
        store.get(job_id).unwrap().unwrap().status,
        JobStatus::Cancelled
    );
}

#[test]
fn tighter_budget_dead_letters_sooner() {
    let store = InMemoryJobStore::arc();
    let ledger = FakeLedger::new();
    let config = BackoffConfig::exponential(
        2,
        Duration::from_millis(10),
        Duration::from_millis(100),
    );
    let worker = lookup_worker(store.clone(), ledger, config);

    let job = Job::new("payment.confirmed", "TX-777", serde_json::json!({}));
    store.enqueue(job).unwrap();

    for _ in 1..=2 {
        let mut claimed = store.claim_next().unwrap().unwrap();
        assert!(worker.execute_one(&mut claimed).is_err());
        if !claimed.status.is_terminal() {
            skip_backoff(&store, &claimed);
        }
    }

    let dls = store.list_dead_letters(10).unwrap();
    assert_eq!(dls.len(), 1);
    assert!(matches!(
        dls[0].job.status,
        JobStatus::DeadLettered { attempts: 2, .. }
    ));
}
