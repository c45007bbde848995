//! Core circular queue algorithm.
//!
//! A heap-allocated ring of `capacity + 1` slots indexed by two atomic cursors:
//! `in_pos` (next slot the producer writes) and `out_pos` (next slot the
//! consumer reads). One slot always stays empty, so `in_pos == out_pos` means
//! empty and `bump(in_pos) == out_pos` means full.
//!
//! A slot holds an initialized value iff it lies in `[out_pos, in_pos)`
//! (cyclically). Payload writes happen before the Release store that publishes
//! the cursor; the other side Acquire-loads the cursor before touching a slot.
//!
//! # Safety
//!
//! The role-bound methods are `unsafe`: the caller must guarantee that at most
//! one producer and at most one consumer use the ring at any instant. The safe
//! queues in [`crate::sync`] uphold this with handle types and push guards.

use std::cell::UnsafeCell;
use std::mem::{self, MaybeUninit};
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;

/// Shrinking would discard buffered elements; the queue was left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot resize to capacity {requested}: {buffered} elements are buffered")]
pub struct ResizeError {
    /// The capacity that was asked for.
    pub requested: usize,
    /// Elements in the queue at the time of the call.
    pub buffered: usize,
}

/// A single slot in the ring buffer.
pub(crate) struct Slot<T> {
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Slot<T> {
    const fn vacant() -> Self {
        Self {
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }
}

/// Storage for `capacity` elements plus the reserved empty slot.
///
/// Panics with "capacity overflow" if `capacity + 1` does not fit in `usize`.
fn alloc_slots<T>(capacity: usize) -> Box<[Slot<T>]> {
    let Some(buf_size) = capacity.checked_add(1) else {
        panic!("capacity overflow");
    };
    (0..buf_size).map(|_| Slot::vacant()).collect()
}

/// Producer-side state: the write cursor.
#[repr(C)]
#[repr(align(64))]
pub(crate) struct ProducerState {
    /// Written by the producer (or the consumer while it holds the push guard).
    pub(crate) in_pos: AtomicUsize,
}

impl ProducerState {
    const fn new() -> Self {
        Self {
            in_pos: AtomicUsize::new(0),
        }
    }
}

/// Consumer-side state: the read cursor.
#[repr(C)]
#[repr(align(64))]
pub(crate) struct ConsumerState {
    /// Written by the consumer only.
    pub(crate) out_pos: AtomicUsize,
}

impl ConsumerState {
    const fn new() -> Self {
        Self {
            out_pos: AtomicUsize::new(0),
        }
    }
}

/// Ring buffer shared by the SPSC and MPSC queues.
pub(crate) struct Ring<T> {
    producer: ProducerState,
    consumer: ConsumerState,
    slots: Box<[Slot<T>]>,
}

/// Publishes consumer progress once, even if a destination drop unwinds.
struct PopProgress<'a, T> {
    ring: &'a Ring<T>,
    start: usize,
    taken: usize,
}

impl<T> Drop for PopProgress<'_, T> {
    fn drop(&mut self) {
        let out_pos = self.ring.advance(self.start, self.taken);
        self.ring.consumer.out_pos.store(out_pos, Ordering::Release);
    }
}

impl<T> Ring<T> {
    /// Creates a ring that can hold `capacity` elements.
    ///
    /// # Panics
    ///
    /// If `capacity == usize::MAX` or the allocation fails.
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            producer: ProducerState::new(),
            consumer: ConsumerState::new(),
            slots: alloc_slots(capacity),
        }
    }

    #[inline]
    fn buf_size(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.buf_size() - 1
    }

    /// `(pos + 1) % buf_size` without the division.
    #[inline]
    fn bump(&self, pos: usize) -> usize {
        let next = pos + 1;
        if next == self.buf_size() { 0 } else { next }
    }

    /// Both arguments are below `buf_size`, so the sum cannot overflow in practice.
    #[inline]
    fn advance(&self, pos: usize, by: usize) -> usize {
        (pos + by) % self.buf_size()
    }

    /// Cyclic distance from `from` forward to `to`.
    #[inline]
    fn distance(&self, from: usize, to: usize) -> usize {
        if to >= from {
            to - from
        } else {
            to + self.buf_size() - from
        }
    }

    #[inline]
    fn slot(&self, idx: usize) -> *mut MaybeUninit<T> {
        self.slots[idx].value.get()
    }

    /// Moves the value out of slot `idx`.
    ///
    /// # Safety
    ///
    /// The slot must be initialized and owned by the caller; it is vacant
    /// afterwards.
    #[inline]
    unsafe fn take(&self, idx: usize) -> T {
        // SAFETY: guaranteed initialized and exclusively owned by the caller.
        unsafe { self.slot(idx).read().assume_init() }
    }

    /// Snapshot count of elements ready to pop.
    ///
    /// Exact for the consumer's own cursor; the producer's cursor may advance
    /// right after the load, so the consumer never sees more than exists.
    pub(crate) fn available(&self) -> usize {
        let out_pos = self.consumer.out_pos.load(Ordering::Acquire);
        let in_pos = self.producer.in_pos.load(Ordering::Acquire);
        self.distance(out_pos, in_pos)
    }

    /// Snapshot count of free slots.
    pub(crate) fn available_for_push(&self) -> usize {
        let in_pos = self.producer.in_pos.load(Ordering::Acquire);
        let out_pos = self.consumer.out_pos.load(Ordering::Acquire);
        self.capacity() - self.distance(out_pos, in_pos)
    }

    /// Attempts to push an item onto the ring.
    ///
    /// # Safety
    ///
    /// Caller must be the only producer for the duration of the call.
    #[inline]
    pub(crate) unsafe fn push(&self, item: T) -> Result<(), T> {
        let in_pos = self.producer.in_pos.load(Ordering::Relaxed);
        let next = self.bump(in_pos);

        // Acquire pairs with the consumer's Release of out_pos: the slot at
        // in_pos has been fully read before we overwrite it.
        if next == self.consumer.out_pos.load(Ordering::Acquire) {
            return Err(item);
        }

        // SAFETY: in_pos is outside [out_pos, in_pos), so it is vacant and
        // only the producer may write it until in_pos is published.
        unsafe {
            self.slot(in_pos).write(MaybeUninit::new(item));
        }

        self.producer.in_pos.store(next, Ordering::Release);
        Ok(())
    }

    /// Pushes clones of the longest prefix of `items` that fits.
    ///
    /// The cursor is published once, after every copied element is written.
    ///
    /// # Safety
    ///
    /// Caller must be the only producer for the duration of the call.
    pub(crate) unsafe fn push_n(&self, items: &[T]) -> usize
    where
        T: Clone,
    {
        let in_pos = self.producer.in_pos.load(Ordering::Relaxed);
        let out_pos = self.consumer.out_pos.load(Ordering::Acquire);
        let free = self.capacity() - self.distance(out_pos, in_pos);
        let count = items.len().min(free);
        if count == 0 {
            return 0;
        }

        let mut pos = in_pos;
        for item in &items[..count] {
            // SAFETY: the `count` slots starting at in_pos are vacant and
            // unpublished, so the consumer cannot observe them yet.
            unsafe {
                self.slot(pos).write(MaybeUninit::new(item.clone()));
            }
            pos = self.bump(pos);
        }

        self.producer.in_pos.store(pos, Ordering::Release);
        count
    }

    /// Attempts to pop the oldest item.
    ///
    /// # Safety
    ///
    /// Caller must be the only consumer for the duration of the call.
    #[inline]
    pub(crate) unsafe fn pop(&self) -> Option<T> {
        let out_pos = self.consumer.out_pos.load(Ordering::Relaxed);
        if self.producer.in_pos.load(Ordering::Acquire) == out_pos {
            return None;
        }

        // SAFETY: out_pos != in_pos, so the slot was published by the producer.
        // It cannot be overwritten until the store below.
        let item = unsafe { self.take(out_pos) };

        self.consumer
            .out_pos
            .store(self.bump(out_pos), Ordering::Release);
        Some(item)
    }

    /// Moves up to `dst.len()` items into `dst` in FIFO order.
    ///
    /// The occupied region is at most two contiguous index ranges: from
    /// `out_pos` to the end of the storage, then from slot 0.
    ///
    /// # Safety
    ///
    /// Caller must be the only consumer for the duration of the call.
    pub(crate) unsafe fn pop_n(&self, dst: &mut [T]) -> usize {
        let out_pos = self.consumer.out_pos.load(Ordering::Relaxed);
        let in_pos = self.producer.in_pos.load(Ordering::Acquire);
        let count = dst.len().min(self.distance(out_pos, in_pos));
        if count == 0 {
            return 0;
        }

        let first = count.min(self.buf_size() - out_pos);
        let (head, wrapped) = dst[..count].split_at_mut(first);
        let mut progress = PopProgress {
            ring: self,
            start: out_pos,
            taken: 0,
        };
        for (idx, d) in (out_pos..).zip(head.iter_mut()).chain((0..).zip(wrapped.iter_mut())) {
            // SAFETY: idx is within the published region [out_pos, in_pos).
            let item = unsafe { progress.ring.take(idx) };
            progress.taken += 1;
            *d = item;
        }
        count
    }

    /// Returns the oldest item without removing it.
    ///
    /// # Safety
    ///
    /// Caller must be the consumer and must not pop while the reference lives.
    pub(crate) unsafe fn peek(&self) -> Option<&T> {
        let out_pos = self.consumer.out_pos.load(Ordering::Relaxed);
        if self.producer.in_pos.load(Ordering::Acquire) == out_pos {
            return None;
        }
        // SAFETY: the slot is published and stays put until the consumer pops.
        Some(unsafe { (*self.slot(out_pos)).assume_init_ref() })
    }

    /// Returns the oldest item mutably without removing it.
    ///
    /// # Safety
    ///
    /// Same as [`Ring::peek`], and the caller must not create other
    /// references to the front slot while this one lives.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn front_mut(&self) -> Option<&mut T> {
        let out_pos = self.consumer.out_pos.load(Ordering::Relaxed);
        if self.producer.in_pos.load(Ordering::Acquire) == out_pos {
            return None;
        }
        // SAFETY: published slot, exclusively owned by the consumer.
        Some(unsafe { (*self.slot(out_pos)).assume_init_mut() })
    }

    /// Pops every item present at entry, releasing each slot before calling `f`.
    ///
    /// # Safety
    ///
    /// Caller must be the only consumer for the duration of the call.
    pub(crate) unsafe fn for_each(&self, mut f: impl FnMut(T)) {
        let end = self.producer.in_pos.load(Ordering::Acquire);
        let mut out_pos = self.consumer.out_pos.load(Ordering::Relaxed);
        while out_pos != end {
            // SAFETY: [out_pos, end) was published before the Acquire above.
            let item = unsafe { self.take(out_pos) };
            out_pos = self.bump(out_pos);
            self.consumer.out_pos.store(out_pos, Ordering::Release);
            f(item);
        }
    }

    /// Drops every item present at entry. Items pushed concurrently survive.
    ///
    /// # Safety
    ///
    /// Caller must be the only consumer for the duration of the call.
    pub(crate) unsafe fn flush(&self) {
        // SAFETY: forwarded from the caller.
        unsafe { self.for_each(drop) }
    }

    /// Moves the oldest item to the back and returns a reference to it.
    ///
    /// The front slot is released before the back slot is written, and the
    /// back slot is always the reserved empty one, so this never overruns a
    /// full ring.
    ///
    /// # Safety
    ///
    /// Caller must be the only consumer and must hold the push guard, so no
    /// producer moves `in_pos` during the call. The reference must not outlive
    /// the caller's consumer role.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn requeue_front(&self) -> Option<&mut T> {
        let out_pos = self.consumer.out_pos.load(Ordering::Relaxed);
        let in_pos = self.producer.in_pos.load(Ordering::Acquire);
        if in_pos == out_pos {
            return None;
        }

        // SAFETY: published slot owned by the consumer.
        let item = unsafe { self.take(out_pos) };
        self.consumer
            .out_pos
            .store(self.bump(out_pos), Ordering::Release);

        let back = self.slot(in_pos);
        // SAFETY: in_pos is the vacant reserved slot and producers are locked out.
        unsafe {
            back.write(MaybeUninit::new(item));
        }
        self.producer
            .in_pos
            .store(self.bump(in_pos), Ordering::Release);

        // SAFETY: just initialized; nobody else reads it before the consumer
        // pops it, which requires the caller's role.
        Some(unsafe { (*back).assume_init_mut() })
    }

    /// Reallocates storage for `capacity` elements, keeping buffered items in order.
    ///
    /// All-or-nothing: fails without touching the ring when the buffered items
    /// do not fit.
    ///
    /// # Panics
    ///
    /// Like [`Ring::with_capacity`], before any element moves.
    pub(crate) fn resize(&mut self, capacity: usize) -> Result<(), ResizeError> {
        if capacity == self.capacity() {
            return Ok(());
        }
        let buffered = self.available();
        if buffered > capacity {
            return Err(ResizeError {
                requested: capacity,
                buffered,
            });
        }

        let mut slots = alloc_slots(capacity);
        let mut out_pos = *self.consumer.out_pos.get_mut();
        for slot in slots.iter_mut().take(buffered) {
            // SAFETY: exclusive access; out_pos walks the initialized region.
            let item = unsafe { self.take(out_pos) };
            slot.value.get_mut().write(item);
            out_pos = self.bump(out_pos);
        }

        // Old slots are all vacant now; dropping the box frees storage only.
        self.slots = slots;
        *self.producer.in_pos.get_mut() = buffered;
        *self.consumer.out_pos.get_mut() = 0;
        Ok(())
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        if !mem::needs_drop::<T>() {
            return;
        }
        let in_pos = *self.producer.in_pos.get_mut();
        let mut out_pos = *self.consumer.out_pos.get_mut();
        while out_pos != in_pos {
            // SAFETY: exclusive access and the slot is in the initialized region.
            unsafe { self.slots[out_pos].value.get_mut().assume_init_drop() };
            out_pos = self.bump(out_pos);
        }
    }
}

// SAFETY: Ring is Send because it owns its T values and the cursors are atomics.
unsafe impl<T: Send> Send for Ring<T> {}

// SAFETY: Ring is Sync because concurrent access is mediated by atomics:
// - in_pos/out_pos are published with Release and read with Acquire
// - each slot is owned by exactly one side at a time per the cursor protocol
unsafe impl<T: Send> Sync for Ring<T> {}
