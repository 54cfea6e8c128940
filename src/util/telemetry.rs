//! Logging setup.
//!
//! Resources log lifecycle at `info` (created, removed, scheduler threads
//! started and stopped), drains, commits and forwarded totals at `debug`,
//! and rejected requests, driver failures and out-of-band voltages at `warn`.
//! Scheduler threads are named `bos-<resource>`, so thread names are part of
//! every line.

/// Install a fmt subscriber filtered by `RUST_LOG`, unless the application
/// already installed one.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_thread_names(true)
        .with_target(false)
        .try_init();
}
