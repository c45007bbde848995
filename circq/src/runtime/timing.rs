//! Timing primitives for the cooperative scheduler.
//!
//! Clocks are injected through [`Clock`], so tests drive time with
//! [`ManualClock`] instead of sleeping.

mod clock;
mod time;

pub use clock::{Clock, ManualClock, MonotonicClock, PeriodicTimer};
pub use time::{Duration, Micros, Millis, TimeUnit, Timestamp};
