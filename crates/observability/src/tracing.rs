//! Tracing/logging initialization.
//!
//! Workers emit structured fields (`kind`, `correlation_key`, `source_event`)
//! on every retry decision; JSON output keeps them machine-aggregatable so
//! sinks never parse the formatted message.

use tracing_subscriber::EnvFilter;

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops). Filtering is
/// controlled via `RUST_LOG`; by default the queue's own targets log at
/// debug, everything else at info.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ledgerq_queue=debug,ledgerq_core=debug"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
