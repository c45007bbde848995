//! Cooperative runtime built on the queues.
//!
//! - `timing`: clocks, typed durations and the periodic timer.
//! - `scheduler`: deferred and recurrent functions drained from a run loop.

pub mod scheduler;
pub mod timing;
