//! Tracing infrastructure for debugging circq.
//!
//! Enable with `--features tracing`. Without the feature the crate-internal
//! macros expand to nothing. The queues themselves never log; the scheduler
//! reports rejected schedules, rejected drains and per-pass summaries.

/// Installs a global `tracing` subscriber with uptime timestamps.
///
/// Filtering follows `RUST_LOG`, defaulting to `circq=trace`. Calling it
/// again after a subscriber is installed has no effect, so every test may
/// call it. Does nothing if the `tracing` feature is not enabled.
#[cfg(feature = "tracing")]
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("circq=trace"));

    // A subscriber installed earlier wins; that is not an error for us.
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_names(true)
                .with_timer(fmt::time::uptime()),
        )
        .with(filter)
        .try_init();
}

#[cfg(not(feature = "tracing"))]
pub const fn init_tracing() {}

#[cfg(feature = "tracing")]
pub(crate) use tracing::{debug, trace};

#[cfg(not(feature = "tracing"))]
macro_rules! disabled {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
pub(crate) use {disabled as debug, disabled as trace};
