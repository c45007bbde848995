//! Guarded MPSC circular queue.
//!
//! The SPSC ring with its push side serialized by a [`CriticalSection`], so any
//! number of producers may push concurrently while one consumer stays
//! lock-free against them.
//!
//! # Overview
//!
//! - [`MpQueue`] - Shared by reference; `push`/`push_n` from any context
//! - [`MpConsumer`] - The single read end, claimed with [`MpQueue::consumer`]
//! - Requeueing: [`MpConsumer::pop_requeue`] and [`MpConsumer::for_each_requeue`]
//!   rotate elements to the back for round-robin processing
//!
//! # Example
//!
//! ```
//! use circq::sync::mpsc::MpQueue;
//!
//! let queue = MpQueue::<u32>::with_capacity(8);
//!
//! std::thread::scope(|s| {
//!     s.spawn(|| queue.push(1).expect("Queue full"));
//!     s.spawn(|| queue.push(2).expect("Queue full"));
//! });
//!
//! let mut consumer = queue.consumer()?;
//! // Keep odd values, drop even ones.
//! assert!(consumer.for_each_requeue(|v| *v % 2 == 1));
//! assert_eq!(consumer.pop(), Some(1));
//! # Ok::<(), circq::sync::mpsc::ConsumerBusy>(())
//! ```

use std::io;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use super::guard::{CriticalSection, MutexSection};
use super::spsc::{CircularQueue, PhantomUnsync, Timeout, expired};
use crate::spsc::ResizeError;
use crate::spsc::ring::Ring;

/// Another [`MpConsumer`] for this queue is still alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("queue consumer is already claimed")]
pub struct ConsumerBusy;

/// Fixed-capacity multi-producer/single-consumer FIFO.
pub struct MpQueue<T, G = MutexSection> {
    ring: Ring<T>,
    guard: G,
    consumer_claimed: AtomicBool,
}

impl<T> MpQueue<T> {
    /// Creates a valid zero-capacity placeholder guarded by a mutex.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates a queue of `capacity` elements guarded by a mutex.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_guard(capacity, MutexSection::new())
    }
}

impl<T> Default for MpQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Takes over the storage of a single-producer queue, keeping its contents
/// and capacity.
impl<T, G: CriticalSection + Default> From<CircularQueue<T>> for MpQueue<T, G> {
    fn from(queue: CircularQueue<T>) -> Self {
        Self {
            ring: queue.into_ring(),
            guard: G::default(),
            consumer_claimed: AtomicBool::new(false),
        }
    }
}

impl<T, G: CriticalSection> MpQueue<T, G> {
    /// Creates a queue of `capacity` elements whose push side runs inside `guard`.
    ///
    /// # Panics
    ///
    /// Panics with "capacity overflow" if `capacity == usize::MAX`.
    #[must_use]
    pub fn with_guard(capacity: usize, guard: G) -> Self {
        Self {
            ring: Ring::with_capacity(capacity),
            guard,
            consumer_claimed: AtomicBool::new(false),
        }
    }

    /// Maximum number of elements the queue can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Reallocates the queue, preserving buffered elements in order.
    ///
    /// The exclusive borrow keeps every producer and the consumer out for
    /// the duration of the call.
    ///
    /// # Errors
    ///
    /// Returns [`ResizeError`] and leaves the queue unmodified if more than
    /// `capacity` elements are buffered.
    ///
    /// # Panics
    ///
    /// Panics with "capacity overflow" if `capacity == usize::MAX`.
    pub fn set_capacity(&mut self, capacity: usize) -> Result<(), ResizeError> {
        self.ring.resize(capacity)
    }

    /// Snapshot number of elements that can be popped.
    #[inline]
    pub fn available(&self) -> usize {
        self.ring.available()
    }

    /// Snapshot number of free slots.
    #[inline]
    pub fn available_for_push(&self) -> usize {
        self.ring.available_for_push()
    }

    /// Appends an element; safe to call from many producers at once.
    ///
    /// # Errors
    ///
    /// Returns `Err(item)` if the queue is full.
    #[inline]
    pub fn push(&self, item: T) -> Result<(), T> {
        // SAFETY: the guard admits one producer at a time.
        self.guard.with(|| unsafe { self.ring.push(item) })
    }

    /// Appends clones of the longest prefix of `items` that fits.
    ///
    /// The whole batch is pushed inside one critical section, so the batch
    /// stays contiguous relative to other producers.
    pub fn push_n(&self, items: &[T]) -> usize
    where
        T: Clone,
    {
        // SAFETY: the guard admits one producer at a time.
        self.guard.with(|| unsafe { self.ring.push_n(items) })
    }

    /// Spins until space is available, then pushes.
    ///
    /// The guard is released between attempts.
    ///
    /// # Errors
    ///
    /// Returns `Err(item)` on timeout.
    pub fn push_blocking(&self, mut item: T, timeout: Timeout) -> Result<(), T> {
        let deadline = timeout.deadline();
        loop {
            match self.push(item) {
                Ok(()) => return Ok(()),
                Err(returned) => {
                    item = returned;
                    if expired(deadline) {
                        return Err(item);
                    }
                    std::hint::spin_loop();
                }
            }
        }
    }

    /// Claims the consumer role.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerBusy`] while another consumer handle is alive,
    /// including when called from inside that consumer's callbacks.
    pub fn consumer(&self) -> Result<MpConsumer<'_, T, G>, ConsumerBusy> {
        self.consumer_claimed
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map_err(|_| ConsumerBusy)?;
        Ok(MpConsumer {
            queue: self,
            _unsync: PhantomData,
        })
    }
}

/// Read end of an [`MpQueue`]; the claim is released on drop.
///
/// `Send` but not `Sync`, like the SPSC handles.
pub struct MpConsumer<'a, T, G: CriticalSection = MutexSection> {
    queue: &'a MpQueue<T, G>,
    _unsync: PhantomUnsync,
}

impl<T, G: CriticalSection> Drop for MpConsumer<'_, T, G> {
    fn drop(&mut self) {
        // Release hands the consumer cursor to the next claimant.
        self.queue.consumer_claimed.store(false, Ordering::Release);
    }
}

impl<T, G: CriticalSection> MpConsumer<'_, T, G> {
    #[inline]
    fn ring(&self) -> &Ring<T> {
        &self.queue.ring
    }

    /// Attempts to pop an item (lock-free).
    #[inline]
    #[must_use]
    pub fn pop(&self) -> Option<T> {
        // SAFETY: the claim makes this the only consumer.
        unsafe { self.ring().pop() }
    }

    /// Moves up to `dst.len()` items into `dst`, oldest first.
    pub fn pop_n(&self, dst: &mut [T]) -> usize {
        // SAFETY: the claim makes this the only consumer.
        unsafe { self.ring().pop_n(dst) }
    }

    /// Copy of the next item without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<T>
    where
        T: Clone,
    {
        // SAFETY: the claim makes this the only consumer.
        unsafe { self.ring().peek().cloned() }
    }

    /// Pops every item present at the call, releasing each slot before `f` runs.
    pub fn for_each(&self, f: impl FnMut(T)) {
        // SAFETY: the claim makes this the only consumer.
        unsafe { self.ring().for_each(f) }
    }

    /// Drops every item present at the call.
    pub fn flush(&self) {
        // SAFETY: the claim makes this the only consumer.
        unsafe { self.ring().flush() }
    }

    /// Snapshot number of items that can be popped.
    #[inline]
    pub fn available(&self) -> usize {
        self.ring().available()
    }

    /// Spins until an item is available, then pops.
    #[must_use]
    pub fn pop_blocking(&self, timeout: Timeout) -> Option<T> {
        let deadline = timeout.deadline();
        loop {
            if let Some(item) = self.pop() {
                return Some(item);
            }
            if expired(deadline) {
                return None;
            }
            std::hint::spin_loop();
        }
    }

    /// Moves the oldest item to the back of the queue.
    ///
    /// Returns a reference to the requeued item, or `None` (and no state
    /// change) if the queue is empty.
    pub fn pop_requeue(&mut self) -> Option<&mut T> {
        let ring = &self.queue.ring;
        // SAFETY: consumer claim plus push guard; the reference borrows self
        // mutably, so nothing can pop it while it lives.
        self.queue.guard.with(|| unsafe { ring.requeue_front() })
    }

    /// Visits each item present at the call once, oldest first.
    ///
    /// When `f` returns `true` the item is requeued at the back, otherwise it
    /// is dropped. Items pushed during the pass, including requeued ones, are
    /// not visited again: the pass is bounded by the item count at entry.
    ///
    /// Returns `false` without calling `f` if the queue was empty.
    pub fn for_each_requeue(&mut self, mut f: impl FnMut(&mut T) -> bool) -> bool {
        let ring = &self.queue.ring;
        let pending = ring.available();
        if pending == 0 {
            return false;
        }

        for _ in 0..pending {
            // SAFETY: consumer claim; the reference ends before the slot moves.
            let Some(item) = (unsafe { ring.front_mut() }) else {
                break;
            };
            if f(item) {
                // SAFETY: consumer claim plus push guard.
                self.queue.guard.with(|| unsafe {
                    ring.requeue_front();
                });
            } else {
                // SAFETY: consumer claim.
                drop(unsafe { ring.pop() });
            }
        }
        true
    }
}

impl<G: CriticalSection> io::Read for MpConsumer<'_, u8, G> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.pop_n(buf) {
            0 if !buf.is_empty() => Err(io::ErrorKind::WouldBlock.into()),
            n => Ok(n),
        }
    }
}
