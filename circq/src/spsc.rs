//! Core circular queue primitives.
//!
//! This module contains the ring buffer algorithm shared by:
//! - [`crate::sync::spsc`] - Single-producer queue with split handles
//! - [`crate::sync::mpsc`] - Multi-producer queue with a guarded push side

pub(crate) mod ring;

pub use ring::ResizeError;
