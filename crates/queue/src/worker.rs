//! Polling worker that executes jobs and consults the retry classifier.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use ledgerq_core::{RetryClassifier, RetryDecision};

use super::store::{JobStore, JobStoreError};
use super::types::{Job, JobError, JobStatus};

/// Job handler function type.
///
/// Handlers must be idempotent for a given correlation key: delivery is
/// at-least-once, so the same logical job may execute any number of times.
pub type JobHandler = Box<dyn Fn(&Job) -> Result<(), JobError> + Send + Sync>;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often to poll for ready jobs
    pub poll_interval: Duration,
    /// Name for logging
    pub name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            name: "ledgerq-worker".to_string(),
        }
    }
}

impl WorkerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Handle to control a running worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl WorkerHandle {
    /// Request graceful shutdown.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    /// Get current worker statistics.
    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().unwrap().clone()
    }
}

/// Worker runtime statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct WorkerStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_retried: u64,
    pub jobs_dead_lettered: u64,
    pub uptime_secs: u64,
}

/// Background job worker.
///
/// Polls a job store for ready jobs, executes them with registered handlers,
/// and turns typed retryable failures into schedule decisions via the
/// classifier. The classifier is pure, so any number of workers can share one
/// store without coordination beyond the store itself.
pub struct Worker<S: JobStore> {
    store: S,
    handlers: HashMap<String, JobHandler>,
    classifier: RetryClassifier,
}

impl<S: JobStore + 'static> Worker<S> {
    /// Create a new worker over the given store and classifier.
    pub fn new(store: S, classifier: RetryClassifier) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
            classifier,
        }
    }

    /// Register a handler for a source event.
    ///
    /// Patterns: exact event name, `"prefix.*"` category match, or `"*"`.
    pub fn register_handler<F>(&mut self, event_pattern: impl Into<String>, handler: F)
    where
        F: Fn(&Job) -> Result<(), JobError> + Send + Sync + 'static,
    {
        self.handlers.insert(event_pattern.into(), Box::new(handler));
    }

    pub fn classifier(&self) -> &RetryClassifier {
        &self.classifier
    }

    fn get_handler(&self, source_event: &str) -> Option<&JobHandler> {
        if let Some(h) = self.handlers.get(source_event) {
            return Some(h);
        }

        // Category match (e.g. "payment.*" matches "payment.confirmed")
        for (pattern, handler) in &self.handlers {
            if pattern.ends_with(".*") {
                let prefix = &pattern[..pattern.len() - 2];
                if source_event.starts_with(prefix) {
                    return Some(handler);
                }
            }
        }

        self.handlers.get("*")
    }

    /// Spawn the worker in a background thread.
    pub fn spawn(self, config: WorkerConfig) -> WorkerHandle
    where
        S: Send,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(WorkerStats::default()));
        let stats_clone = stats.clone();

        let name = config.name.clone();
        let join = thread::Builder::new()
            .name(name)
            .spawn(move || {
                worker_loop(self, config, shutdown_rx, stats_clone);
            })
            .expect("failed to spawn worker thread");

        WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        }
    }

    /// Execute a single claimed job (for tests or synchronous draining).
    ///
    /// The job must already be `Processing` (i.e. came out of `claim_next`).
    pub fn execute_one(&self, job: &mut Job) -> Result<(), String> {
        let started = Utc::now();

        let Some(handler) = self.get_handler(&job.source_event) else {
            // A job nothing can handle is broken, not transient: leaving it
            // `Processing` would strand it in the store forever.
            let reason = format!("no handler for source event: {}", job.source_event);
            error!(
                job_id = %job.id,
                correlation_key = %job.correlation_key,
                source_event = %job.source_event,
                "no handler registered, dead-lettering"
            );
            job.mark_dead_lettered(reason.clone(), started);
            self.store
                .dead_letter(job.clone(), reason.clone())
                .map_err(stringify)?;
            return Err(reason);
        };

        match handler(job) {
            Ok(()) => {
                job.mark_succeeded(started);
                self.store.update(job).map_err(stringify)?;
                debug!(job_id = %job.id, correlation_key = %job.correlation_key, "job succeeded");
                Ok(())
            }
            Err(JobError::Retryable(failure)) => {
                match self.classifier.classify(&failure, job.attempt) {
                    RetryDecision::Retry { delay, max_attempts } => {
                        warn!(
                            job_id = %job.id,
                            kind = failure.kind().as_str(),
                            correlation_key = failure.correlation_key(),
                            source_event = failure.source_event(),
                            attempt = job.attempt,
                            max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            "transient failure, scheduling retry"
                        );
                        let message = failure.message();
                        job.mark_awaiting_retry(failure.kind(), delay, started, message.clone());
                        self.store.update(job).map_err(stringify)?;
                        Err(message)
                    }
                    RetryDecision::Fail { reason } => {
                        error!(
                            job_id = %job.id,
                            kind = failure.kind().as_str(),
                            correlation_key = failure.correlation_key(),
                            source_event = failure.source_event(),
                            attempts = job.attempt,
                            "retry budget exhausted, dead-lettering"
                        );
                        job.mark_dead_lettered(reason.clone(), started);
                        self.store
                            .dead_letter(job.clone(), reason.clone())
                            .map_err(stringify)?;
                        Err(reason)
                    }
                }
            }
            Err(JobError::Fatal(reason)) => {
                // Not covered by the retry mechanism; straight to the sink.
                error!(
                    job_id = %job.id,
                    correlation_key = %job.correlation_key,
                    source_event = %job.source_event,
                    error = %reason,
                    "fatal failure, dead-lettering"
                );
                job.mark_dead_lettered(reason.clone(), started);
                self.store
                    .dead_letter(job.clone(), reason.clone())
                    .map_err(stringify)?;
                Err(reason)
            }
        }
    }
}

fn stringify(e: JobStoreError) -> String {
    e.to_string()
}

fn worker_loop<S: JobStore + 'static>(
    worker: Worker<S>,
    config: WorkerConfig,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<WorkerStats>>,
) {
    info!(worker = %config.name, "worker started");
    let start_time = Instant::now();

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        {
            let mut s = stats.lock().unwrap();
            s.uptime_secs = start_time.elapsed().as_secs();
        }

        match worker.store.claim_next() {
            Ok(Some(mut job)) => {
                debug!(
                    worker = %config.name,
                    job_id = %job.id,
                    source_event = %job.source_event,
                    attempt = job.attempt,
                    "claimed job"
                );

                let result = worker.execute_one(&mut job);

                let mut s = stats.lock().unwrap();
                s.jobs_processed += 1;
                match (&result, &job.status) {
                    (Ok(()), _) => s.jobs_succeeded += 1,
                    (Err(_), JobStatus::AwaitingRetry { .. }) => s.jobs_retried += 1,
                    (Err(_), JobStatus::DeadLettered { .. }) => s.jobs_dead_lettered += 1,
                    (Err(_), _) => {}
                }
            }
            Ok(None) => {
                thread::sleep(config.poll_interval);
            }
            Err(e) => {
                error!(worker = %config.name, error = %e, "failed to claim job");
                thread::sleep(config.poll_interval);
            }
        }
    }

    info!(worker = %config.name, "worker stopped");
}
