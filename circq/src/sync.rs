//! Thread-safe queues for in-process communication.
//!
//! - [`spsc`]: one producer, one consumer, wait-free on both sides.
//! - [`mpsc`]: many producers serialized by a [`guard::CriticalSection`], one consumer.
//! - [`guard`]: the critical-section abstraction the MPSC push side runs in.

pub mod guard;
pub mod mpsc;
pub mod spsc;
