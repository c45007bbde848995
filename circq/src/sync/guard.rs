//! Critical sections guarding the push side of [`MpQueue`](super::mpsc::MpQueue).
//!
//! Hosted targets serialize producers with a mutex. Bare-metal single-core
//! targets disable interrupts instead, via the `critical-section` crate
//! (enable the `critical-section` feature).

use std::sync::{Mutex, PoisonError};

/// Mutual exclusion for a short, non-blocking region.
pub trait CriticalSection {
    /// Runs `f` with every other caller of `with` on this instance excluded.
    fn with<R>(&self, f: impl FnOnce() -> R) -> R;
}

/// Mutex-backed section for hosted operating systems.
#[derive(Debug, Default)]
pub struct MutexSection(Mutex<()>);

impl MutexSection {
    /// Creates an unlocked section.
    #[must_use]
    pub const fn new() -> Self {
        Self(Mutex::new(()))
    }
}

impl CriticalSection for MutexSection {
    #[inline]
    fn with<R>(&self, f: impl FnOnce() -> R) -> R {
        // The guarded state is the ring cursors, which stay consistent even
        // when a previous holder panicked.
        let _lock = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }
}

/// Interrupt-disabling section for bare-metal targets.
///
/// Every instance shares the one global critical section provided by the
/// linked `critical-section` implementation.
#[cfg(feature = "critical-section")]
#[derive(Debug, Default, Clone, Copy)]
pub struct InterruptSection;

#[cfg(feature = "critical-section")]
impl CriticalSection for InterruptSection {
    #[inline]
    fn with<R>(&self, f: impl FnOnce() -> R) -> R {
        critical_section::with(|_cs| f())
    }
}
