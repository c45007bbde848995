//! Lock-free SPSC circular queue.
//!
//! A bounded FIFO over a heap-allocated ring buffer with atomic cursors.
//!
//! # Overview
//!
//! - [`CircularQueue`] - Owns the storage; `&mut self` operations for a lone owner
//! - [`Producer`] - Write end borrowed from [`CircularQueue::split`]
//! - [`Consumer`] - Read end borrowed from [`CircularQueue::split`]
//! - Lock-free: no mutexes or syscalls between producer and consumer
//!
//! # Example
//!
//! ```
//! use circq::sync::spsc::CircularQueue;
//!
//! let mut queue = CircularQueue::<u32>::with_capacity(4);
//!
//! let (producer, consumer) = queue.split();
//! std::thread::scope(|s| {
//!     s.spawn(move || producer.push(42).expect("Queue full"));
//!     s.spawn(move || while consumer.pop() != Some(42) {});
//! });
//! ```
//!
//! # Byte transport
//!
//! `Producer<'_, u8>` implements [`std::io::Write`] and `Consumer<'_, u8>`
//! implements [`std::io::Read`], which is how a serial endpoint hands received
//! bytes from its completion interrupt to the application's read calls.
//! Both report [`io::ErrorKind::WouldBlock`] instead of blocking.

use std::cell::Cell;
use std::io;
use std::marker::PhantomData;
use std::time::Duration;

use minstant::Instant;

use crate::spsc::ResizeError;
use crate::spsc::ring::Ring;

/// Timeout specification for blocking operations.
#[derive(Debug, Clone, Copy)]
pub enum Timeout {
    /// Wait indefinitely.
    Infinite,
    /// Wait for at most the specified duration.
    Duration(Duration),
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Self::Duration(d)
    }
}

impl Timeout {
    pub(crate) fn deadline(self) -> Option<Instant> {
        match self {
            Self::Infinite => None,
            Self::Duration(d) => Some(Instant::now() + d),
        }
    }
}

pub(crate) fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|dl| Instant::now() > dl)
}

/// Marker type to opt-out of `Sync` while remaining `Send`.
pub(crate) type PhantomUnsync = PhantomData<Cell<&'static ()>>;

/// Fixed-capacity single-producer/single-consumer FIFO.
///
/// Not `Clone`: a queue is one channel between one writer and one reader.
pub struct CircularQueue<T> {
    ring: Ring<T>,
}

impl<T> Default for CircularQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CircularQueue<T> {
    /// Creates a valid zero-capacity placeholder. Every push fails.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates a queue that holds at most `capacity` elements.
    ///
    /// # Panics
    ///
    /// Panics with "capacity overflow" if `capacity == usize::MAX`.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ring: Ring::with_capacity(capacity),
        }
    }

    /// Maximum number of elements the queue can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Reallocates the queue, preserving buffered elements in order.
    ///
    /// # Errors
    ///
    /// Returns [`ResizeError`] and leaves the queue unmodified if more than
    /// `capacity` elements are buffered.
    ///
    /// # Panics
    ///
    /// Panics with "capacity overflow" if `capacity == usize::MAX`; the queue
    /// keeps its contents.
    pub fn set_capacity(&mut self, capacity: usize) -> Result<(), ResizeError> {
        self.ring.resize(capacity)
    }

    /// Discards all buffered elements.
    pub fn flush(&mut self) {
        // SAFETY: &mut self excludes every other role.
        unsafe { self.ring.flush() }
    }

    /// Number of elements that can be popped.
    #[inline]
    pub fn available(&self) -> usize {
        self.ring.available()
    }

    /// Number of free slots.
    #[inline]
    pub fn available_for_push(&self) -> usize {
        self.ring.available_for_push()
    }

    /// Returns the element the next pop would return.
    pub fn peek(&self) -> Option<&T> {
        // SAFETY: popping requires &mut self, so the reference cannot dangle.
        unsafe { self.ring.peek() }
    }

    /// Appends an element.
    ///
    /// # Errors
    ///
    /// Returns `Err(item)` if the queue is full.
    #[inline]
    pub fn push(&mut self, item: T) -> Result<(), T> {
        // SAFETY: &mut self makes us the only producer.
        unsafe { self.ring.push(item) }
    }

    /// Appends clones of the longest prefix of `items` that fits.
    ///
    /// Returns the number of elements copied, counted from the head of `items`.
    pub fn push_n(&mut self, items: &[T]) -> usize
    where
        T: Clone,
    {
        // SAFETY: &mut self makes us the only producer.
        unsafe { self.ring.push_n(items) }
    }

    /// Removes the oldest element.
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        // SAFETY: &mut self makes us the only consumer.
        unsafe { self.ring.pop() }
    }

    /// Moves up to `dst.len()` elements into `dst`, oldest first.
    ///
    /// Returns the number of elements written to the head of `dst`.
    pub fn pop_n(&mut self, dst: &mut [T]) -> usize {
        // SAFETY: &mut self makes us the only consumer.
        unsafe { self.ring.pop_n(dst) }
    }

    /// Removes every element present at the call, handing each to `f`.
    pub fn for_each(&mut self, f: impl FnMut(T)) {
        // SAFETY: &mut self makes us the only consumer.
        unsafe { self.ring.for_each(f) }
    }

    pub(crate) fn into_ring(self) -> Ring<T> {
        self.ring
    }

    /// Splits the queue into its producer and consumer ends.
    ///
    /// The handles borrow the queue, so resizing is impossible while either
    /// is alive.
    pub fn split(&mut self) -> (Producer<'_, T>, Consumer<'_, T>) {
        let ring = &self.ring;
        (
            Producer {
                ring,
                _unsync: PhantomData,
            },
            Consumer {
                ring,
                _unsync: PhantomData,
            },
        )
    }
}

/// Write end of the SPSC queue.
///
/// # Thread Safety
///
/// `Producer` is [`Send`] but **not** [`Sync`]:
/// - Can transfer ownership to another thread
/// - Cannot share `&Producer` (no concurrent `push()`)
pub struct Producer<'a, T> {
    ring: &'a Ring<T>,
    _unsync: PhantomUnsync,
}

/// Read end of the SPSC queue.
///
/// See [`Producer`] for thread safety details (same semantics apply).
pub struct Consumer<'a, T> {
    ring: &'a Ring<T>,
    _unsync: PhantomUnsync,
}

impl<T> Producer<'_, T> {
    /// Attempts to push an item (wait-free).
    ///
    /// # Errors
    ///
    /// Returns `Err(item)` if the queue is full, allowing retry.
    #[inline]
    pub fn push(&self, item: T) -> Result<(), T> {
        // SAFETY: the producer handle is unique and not Sync.
        unsafe { self.ring.push(item) }
    }

    /// Pushes clones of the longest prefix of `items` that fits.
    pub fn push_n(&self, items: &[T]) -> usize
    where
        T: Clone,
    {
        // SAFETY: the producer handle is unique and not Sync.
        unsafe { self.ring.push_n(items) }
    }

    /// Spins until space is available, then pushes.
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

    /// Maximum number of elements the queue can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Number of free slots.
    #[inline]
    pub fn available_for_push(&self) -> usize {
        self.ring.available_for_push()
    }
}

impl<T> Consumer<'_, T> {
    /// Attempts to pop an item (wait-free).
    ///
    /// Returns `None` if the queue is empty.
    #[inline]
    #[must_use]
    pub fn pop(&self) -> Option<T> {
        // SAFETY: the consumer handle is unique and not Sync.
        unsafe { self.ring.pop() }
    }

    /// Moves up to `dst.len()` items into `dst`, oldest first.
    pub fn pop_n(&self, dst: &mut [T]) -> usize {
        // SAFETY: the consumer handle is unique and not Sync.
        unsafe { self.ring.pop_n(dst) }
    }

    /// Copy of the next item without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<T>
    where
        T: Clone,
    {
        // SAFETY: only this handle pops, and the clone ends the borrow first.
        unsafe { self.ring.peek().cloned() }
    }

    /// Pops every item present at the call, releasing each slot before `f` runs.
    pub fn for_each(&self, f: impl FnMut(T)) {
        // SAFETY: the consumer handle is unique and not Sync.
        unsafe { self.ring.for_each(f) }
    }

    /// Drops every item present at the call.
    pub fn flush(&self) {
        // SAFETY: the consumer handle is unique and not Sync.
        unsafe { self.ring.flush() }
    }

    /// Number of items that can be popped.
    #[inline]
    pub fn available(&self) -> usize {
        self.ring.available()
    }

    /// Spins until an item is available, then pops.
    ///
    /// Returns `None` on timeout.
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
}

impl io::Write for Producer<'_, u8> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.push_n(buf) {
            0 if !buf.is_empty() => Err(io::ErrorKind::WouldBlock.into()),
            n => Ok(n),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Read for Consumer<'_, u8> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.pop_n(buf) {
            0 if !buf.is_empty() => Err(io::ErrorKind::WouldBlock.into()),
            n => Ok(n),
        }
    }
}
