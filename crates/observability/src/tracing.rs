//! Tracing initialization: JSON logs on stdout, level via `RUST_LOG`.
//!
//! Every `#[instrument]`ed boundary in the repository (capture handling,
//! storage transactions, query phases, subscription delivery) relies on this
//! being called once at process start.

use tracing_subscriber::EnvFilter;

/// Initialize tracing for the process. Safe to call multiple times
/// (subsequent calls are no-ops).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
