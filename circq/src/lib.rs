//! Bounded circular queues.
//!
//! The crate is built around one fixed-capacity ring with a reserved empty
//! slot, exposed three ways:
//!
//! - [`CircularQueue`]: single producer, single consumer. Lock-free; split it
//!   into a [`Producer`] and a [`Consumer`] to use it from two threads.
//! - [`MpQueue`]: many producers whose pushes run inside a
//!   [`CriticalSection`], one consumer that can also requeue elements.
//! - [`Scheduler`]: a deferred-function queue drained by a cooperative loop.
//!
//! Enable the `tracing` feature to get scheduler diagnostics, and the
//! `critical-section` feature for an interrupt-masking push guard.

pub mod runtime;
pub mod spsc;
pub mod sync;
mod trace;

pub use runtime::scheduler::{RunContext, SchedulePolicy, ScheduleError, Scheduler, SchedulerConfig};
pub use spsc::ResizeError;
#[cfg(feature = "critical-section")]
pub use sync::guard::InterruptSection;
pub use sync::guard::{CriticalSection, MutexSection};
pub use sync::mpsc::{ConsumerBusy, MpConsumer, MpQueue};
pub use sync::spsc::{CircularQueue, Consumer, Producer, Timeout};
pub use trace::init_tracing;
