//! Cooperative scheduled-function queue.
//!
//! Any context (another thread, an interrupt handler) defers work by pushing a
//! callable into the scheduler; the one task that owns the run loop drains the
//! queue once per tick with [`Scheduler::run_scheduled_functions`].
//!
//! The queue is an [`MpQueue`], so scheduling never blocks on the drain and the
//! drain never blocks on producers. Each drain is a single
//! [`for_each_requeue`](crate::sync::mpsc::MpConsumer::for_each_requeue)
//! pass: a function that is not due yet, or that asks to run again, goes back
//! to the end of the queue.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use circq::runtime::scheduler::{RunContext, SchedulePolicy, Scheduler, SchedulerConfig};
//!
//! let scheduler = Scheduler::new(SchedulerConfig::default());
//! let hits = Arc::new(AtomicUsize::new(0));
//!
//! let counter = Arc::clone(&hits);
//! scheduler.schedule_function(move || {
//!     counter.fetch_add(1, Ordering::Relaxed);
//! }, SchedulePolicy::FromLoop)?;
//!
//! assert_eq!(scheduler.run_scheduled_functions(RunContext::Loop)?, 1);
//! assert_eq!(scheduler.run_scheduled_functions(RunContext::Loop)?, 0);
//! assert_eq!(hits.load(Ordering::Relaxed), 1);
//! # Ok::<(), circq::runtime::scheduler::ScheduleError>(())
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::runtime::timing::{Clock, Duration, Micros, Millis, MonotonicClock, PeriodicTimer};
use crate::sync::guard::{CriticalSection, MutexSection};
use crate::sync::mpsc::MpQueue;
use crate::trace::{debug, trace};

/// Scheduler sizing and pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum number of pending functions.
    pub queue_capacity: usize,
    /// Wall time a single drain may run before it yields the thread.
    pub yield_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 32,
            yield_interval_ms: 100,
        }
    }
}

/// Where a function may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SchedulePolicy {
    /// Only from a [`RunContext::Loop`] drain.
    #[default]
    FromLoop,
    /// From any drain, including those issued while yielding or delaying.
    Anytime,
}

/// Where the drain is being called from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunContext {
    /// The main run loop, between iterations.
    Loop,
    /// A yield or delay inside user code.
    Yield,
}

/// Error scheduling or running deferred functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// No free slot; the function was dropped.
    #[error("scheduled function queue is full ({capacity} pending)")]
    QueueFull {
        /// Configured queue capacity.
        capacity: usize,
    },
    /// Another drain of this scheduler is in progress (reentrant or concurrent call).
    #[error("scheduled functions are already running")]
    AlreadyRunning,
}

type Job = Box<dyn FnMut() -> bool + Send>;

struct ScheduledFn {
    job: Job,
    due: PeriodicTimer,
    policy: SchedulePolicy,
}

/// Deferred-function queue drained by one cooperative run loop.
///
/// `Sync`: share it by reference or `Arc` with every context that schedules.
pub struct Scheduler<C = MonotonicClock, G = MutexSection> {
    queue: MpQueue<ScheduledFn, G>,
    clock: C,
    yield_interval: Duration<Micros>,
}

impl Scheduler {
    /// Creates a scheduler on the monotonic clock with a mutex-guarded queue.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_clock(config, MonotonicClock::new())
    }
}

impl<C: Clock> Scheduler<C> {
    /// Creates a scheduler reading time from `clock`.
    #[must_use]
    pub fn with_clock(config: SchedulerConfig, clock: C) -> Self {
        Self::with_parts(config, clock, MutexSection::new())
    }
}

impl<C: Clock, G: CriticalSection> Scheduler<C, G> {
    /// Creates a scheduler with an explicit clock and push guard.
    #[must_use]
    pub fn with_parts(config: SchedulerConfig, clock: C, guard: G) -> Self {
        Self {
            queue: MpQueue::with_guard(config.queue_capacity, guard),
            clock,
            yield_interval: Duration::<Millis>::from_millis(config.yield_interval_ms).to_micros(),
        }
    }

    /// Maximum number of pending functions.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Snapshot number of pending functions.
    #[inline]
    pub fn pending(&self) -> usize {
        self.queue.available()
    }

    /// Defers `f` to run once on the next eligible drain.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::QueueFull`] if no slot is free; `f` is dropped.
    pub fn schedule_function(
        &self,
        f: impl FnOnce() + Send + 'static,
        policy: SchedulePolicy,
    ) -> Result<(), ScheduleError> {
        let mut f = Some(f);
        self.schedule_function_us(
            move || {
                if let Some(f) = f.take() {
                    f();
                }
                false
            },
            0,
            policy,
        )
    }

    /// Defers a recurrent function.
    ///
    /// `f` runs on every eligible drain once `repeat_us` microseconds have
    /// elapsed since its last due time (on every drain if `repeat_us` is 0),
    /// and stays scheduled for as long as it returns `true`.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::QueueFull`] if no slot is free; `f` is dropped.
    pub fn schedule_function_us(
        &self,
        f: impl FnMut() -> bool + Send + 'static,
        repeat_us: u64,
        policy: SchedulePolicy,
    ) -> Result<(), ScheduleError> {
        let due = match repeat_us {
            0 => PeriodicTimer::always_expired(),
            us => PeriodicTimer::every(Duration::from_micros(us), self.clock.now()),
        };
        let item = ScheduledFn {
            job: Box::new(f),
            due,
            policy,
        };
        self.queue.push(item).map_err(|_rejected| {
            let capacity = self.queue.capacity();
            debug!(capacity, "scheduled function rejected, queue full");
            ScheduleError::QueueFull { capacity }
        })
    }

    /// Runs every due function once, in scheduling order.
    ///
    /// Functions scheduled while the drain runs (including by the functions
    /// themselves) wait for the next drain. Returns how many functions were
    /// invoked.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::AlreadyRunning`] if called from inside a scheduled
    /// function or while another thread is draining.
    pub fn run_scheduled_functions(&self, ctx: RunContext) -> Result<usize, ScheduleError> {
        let mut consumer = self.queue.consumer().map_err(|_busy| {
            debug!(?ctx, "drain rejected, scheduler already running");
            ScheduleError::AlreadyRunning
        })?;

        let mut invoked = 0usize;
        let mut yield_now = PeriodicTimer::every(self.yield_interval, self.clock.now());
        consumer.for_each_requeue(|item| {
            if !yield_now.period().is_zero() && yield_now.poll(self.clock.now()) {
                trace!(interval = %self.yield_interval, "drain yielding");
                std::thread::yield_now();
            }
            if item.policy == SchedulePolicy::FromLoop && ctx != RunContext::Loop {
                return true;
            }
            if !item.due.poll(self.clock.now()) {
                return true;
            }
            invoked += 1;
            (item.job)()
        });

        trace!(invoked, pending = consumer.available(), ?ctx, "drained scheduled functions");
        Ok(invoked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::timing::ManualClock;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let c = Arc::new(AtomicUsize::new(0));
        (Arc::clone(&c), c)
    }

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.queue_capacity, 32);
        assert_eq!(config.yield_interval_ms, 100);
        assert_eq!(Scheduler::new(config).capacity(), 32);
    }

    #[test]
    fn test_one_shot_runs_once() {
        let scheduler = Scheduler::new(SchedulerConfig::default());
        let (hits, seen) = counter();
        scheduler
            .schedule_function(
                move || {
                    hits.fetch_add(1, Ordering::Relaxed);
                },
                SchedulePolicy::FromLoop,
            )
            .unwrap();

        assert_eq!(scheduler.pending(), 1);
        assert_eq!(scheduler.run_scheduled_functions(RunContext::Loop), Ok(1));
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.run_scheduled_functions(RunContext::Loop), Ok(0));
        assert_eq!(seen.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_queue_full_is_reported() {
        let config = SchedulerConfig {
            queue_capacity: 2,
            ..SchedulerConfig::default()
        };
        let scheduler = Scheduler::new(config);
        for _ in 0..2 {
            scheduler
                .schedule_function(|| {}, SchedulePolicy::Anytime)
                .unwrap();
        }
        assert_eq!(
            scheduler.schedule_function(|| {}, SchedulePolicy::Anytime),
            Err(ScheduleError::QueueFull { capacity: 2 })
        );
    }

    #[test]
    fn test_yield_drain_skips_loop_only_functions() {
        let scheduler = Scheduler::new(SchedulerConfig::default());
        let (loop_hits, loop_seen) = counter();
        let (any_hits, any_seen) = counter();
        scheduler
            .schedule_function(
                move || {
                    loop_hits.fetch_add(1, Ordering::Relaxed);
                },
                SchedulePolicy::FromLoop,
            )
            .unwrap();
        scheduler
            .schedule_function(
                move || {
                    any_hits.fetch_add(1, Ordering::Relaxed);
                },
                SchedulePolicy::Anytime,
            )
            .unwrap();

        assert_eq!(scheduler.run_scheduled_functions(RunContext::Yield), Ok(1));
        assert_eq!(loop_seen.load(Ordering::Relaxed), 0);
        assert_eq!(any_seen.load(Ordering::Relaxed), 1);
        assert_eq!(scheduler.pending(), 1);

        assert_eq!(scheduler.run_scheduled_functions(RunContext::Loop), Ok(1));
        assert_eq!(loop_seen.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_recurrent_function_respects_period() {
        let clock = ManualClock::new();
        let scheduler = Scheduler::with_clock(SchedulerConfig::default(), clock.clone());
        let (hits, seen) = counter();
        scheduler
            .schedule_function_us(
                move || hits.fetch_add(1, Ordering::Relaxed) < 2,
                1_000,
                SchedulePolicy::FromLoop,
            )
            .unwrap();

        assert_eq!(scheduler.run_scheduled_functions(RunContext::Loop), Ok(0));
        clock.advance(Duration::from_micros(999));
        assert_eq!(scheduler.run_scheduled_functions(RunContext::Loop), Ok(0));
        clock.advance(Duration::from_micros(1));
        assert_eq!(scheduler.run_scheduled_functions(RunContext::Loop), Ok(1));
        assert_eq!(scheduler.run_scheduled_functions(RunContext::Loop), Ok(0));

        for _ in 0..2 {
            clock.advance(Duration::from_micros(1_000));
            assert_eq!(scheduler.run_scheduled_functions(RunContext::Loop), Ok(1));
        }
        // Third call returned false and was retired.
        assert_eq!(seen.load(Ordering::Relaxed), 3);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_slow_pass_yields_and_still_visits_everything() {
        let clock = ManualClock::new();
        let config = SchedulerConfig {
            queue_capacity: 4,
            yield_interval_ms: 1,
        };
        let scheduler = Scheduler::with_clock(config, clock.clone());
        let (hits, seen) = counter();

        for _ in 0..4 {
            let clock = clock.clone();
            let hits = Arc::clone(&hits);
            scheduler
                .schedule_function(
                    move || {
                        // Each call outlasts the yield interval.
                        clock.advance(Duration::from_micros(1_500));
                        hits.fetch_add(1, Ordering::Relaxed);
                    },
                    SchedulePolicy::FromLoop,
                )
                .unwrap();
        }

        assert_eq!(scheduler.run_scheduled_functions(RunContext::Loop), Ok(4));
        assert_eq!(seen.load(Ordering::Relaxed), 4);
        assert_eq!(clock.now().as_u64(), 6_000);
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.run_scheduled_functions(RunContext::Loop), Ok(0));
    }

    #[test]
    fn test_reentrant_drain_is_rejected() {
        let scheduler = Arc::new(Scheduler::new(SchedulerConfig::default()));
        let inner = Arc::clone(&scheduler);
        let (errors, seen) = counter();
        scheduler
            .schedule_function(
                move || {
                    if inner.run_scheduled_functions(RunContext::Loop)
                        == Err(ScheduleError::AlreadyRunning)
                    {
                        errors.fetch_add(1, Ordering::Relaxed);
                    }
                },
                SchedulePolicy::FromLoop,
            )
            .unwrap();

        assert_eq!(scheduler.run_scheduled_functions(RunContext::Loop), Ok(1));
        assert_eq!(seen.load(Ordering::Relaxed), 1);
        // The claim was released after the pass.
        assert_eq!(scheduler.run_scheduled_functions(RunContext::Loop), Ok(0));
    }

    #[test]
    fn test_function_scheduled_during_drain_runs_next_pass() {
        let scheduler = Arc::new(Scheduler::new(SchedulerConfig::default()));
        let inner = Arc::clone(&scheduler);
        let (hits, seen) = counter();
        scheduler
            .schedule_function(
                move || {
                    let hits = Arc::clone(&hits);
                    inner
                        .schedule_function(
                            move || {
                                hits.fetch_add(1, Ordering::Relaxed);
                            },
                            SchedulePolicy::FromLoop,
                        )
                        .unwrap();
                },
                SchedulePolicy::FromLoop,
            )
            .unwrap();

        assert_eq!(scheduler.run_scheduled_functions(RunContext::Loop), Ok(1));
        assert_eq!(seen.load(Ordering::Relaxed), 0);
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(scheduler.run_scheduled_functions(RunContext::Loop), Ok(1));
        assert_eq!(seen.load(Ordering::Relaxed), 1);
    }
}
