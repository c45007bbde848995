//! Monotonic clocks and the periodic timer used for recurrent functions.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use minstant::Instant;

use super::time::{Duration, Micros, Timestamp};

/// Source of monotonic microsecond timestamps.
pub trait Clock {
    fn now(&self) -> Timestamp<Micros>;
}

/// Wall clock backed by the TSC where available, anchored at construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Timestamp<Micros> {
        let micros = self.origin.elapsed().as_micros();
        Timestamp::new(u64::try_from(micros).unwrap_or(u64::MAX))
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Arc<AtomicU64>);

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration<Micros>) {
        self.0.fetch_add(by.as_u64(), Ordering::Release);
    }

    pub fn set(&self, now: Timestamp<Micros>) {
        self.0.store(now.as_u64(), Ordering::Release);
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now(&self) -> Timestamp<Micros> {
        Timestamp::new(self.0.load(Ordering::Acquire))
    }
}

/// Polled timer that fires once per elapsed period.
///
/// A zero period is always expired. On expiry the next deadline is the first
/// multiple of the period after `now`, counted from the previous deadline, so
/// a late poll does not cause a burst of catch-up firings.
#[derive(Debug, Clone, Copy)]
pub struct PeriodicTimer {
    period: Duration<Micros>,
    deadline: Timestamp<Micros>,
}

impl PeriodicTimer {
    #[must_use]
    pub const fn always_expired() -> Self {
        Self {
            period: Duration::new(0),
            deadline: Timestamp::new(0),
        }
    }

    /// Timer whose first expiry is one `period` after `now`.
    #[must_use]
    pub fn every(period: Duration<Micros>, now: Timestamp<Micros>) -> Self {
        Self {
            period,
            deadline: now + period,
        }
    }

    #[inline]
    pub const fn period(&self) -> Duration<Micros> {
        self.period
    }

    /// Returns whether the timer expired, re-arming it if so.
    pub fn poll(&mut self, now: Timestamp<Micros>) -> bool {
        if self.period.is_zero() {
            return true;
        }
        if now < self.deadline {
            return false;
        }
        let period = self.period.as_u64();
        let missed = now.saturating_since(self.deadline).as_u64() / period;
        self.deadline = self.deadline + Duration::new(missed.saturating_add(1).saturating_mul(period));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::timing::Millis;

    #[test]
    fn test_zero_period_always_fires() {
        let mut timer = PeriodicTimer::always_expired();
        assert!(timer.poll(Timestamp::new(0)));
        assert!(timer.poll(Timestamp::new(0)));
        assert!(timer.period().is_zero());
    }

    #[test]
    fn test_fires_once_per_period() {
        let mut timer = PeriodicTimer::every(Duration::new(100), Timestamp::new(0));
        assert!(!timer.poll(Timestamp::new(99)));
        assert!(timer.poll(Timestamp::new(100)));
        assert!(!timer.poll(Timestamp::new(150)));
        assert!(timer.poll(Timestamp::new(200)));
    }

    #[test]
    fn test_late_poll_skips_missed_periods() {
        let mut timer = PeriodicTimer::every(Duration::new(10), Timestamp::new(0));
        assert!(timer.poll(Timestamp::new(57)));
        // Next deadline is 60, not 20.
        assert!(!timer.poll(Timestamp::new(59)));
        assert!(timer.poll(Timestamp::new(60)));
    }

    #[test]
    fn test_manual_clock_is_shared() {
        let clock = ManualClock::new();
        let view = clock.clone();
        clock.advance(Duration::from_micros(25));
        assert_eq!(view.now().as_u64(), 25);
        view.set(Timestamp::new(5));
        assert_eq!(clock.now().as_u64(), 5);
    }

    #[test]
    fn test_monotonic_clock_does_not_go_back() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn test_millis_to_micros() {
        assert_eq!(Duration::from_millis(3).to_micros().as_u64(), 3_000);
        assert_eq!(Duration::<Millis>::new(u64::MAX).to_micros().as_u64(), u64::MAX);
    }
}
