//! Single-producer/single-consumer lock-free ring
//!
//! The contract mirrors the classic kfifo shape: a power-of-two capacity,
//! two monotonically increasing `u32` counters, and indices derived by
//! masking. The producer is the owning application thread, the consumer the
//! checker thread; with exactly one of each, a Release store on publish and
//! an Acquire load on consume are the only ordering required.
//!
//! A full ring drops new elements; for the event path, losing a record is
//! preferable to ever blocking the application.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU32, Ordering};

pub struct SpscRing<T> {
    /// Total elements ever enqueued; written by the producer only
    in_count: AtomicU32,
    /// Total elements ever dequeued; written by the consumer only
    out_count: AtomicU32,
    mask: u32,
    buf: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

// SAFETY: sound for one concurrent producer and one concurrent consumer.
// The producer writes slots in `[out, in + n)` before publishing `in` with
// Release; the consumer observes `in` with Acquire before reading those
// slots and publishes `out` with Release afterwards, so a slot is never
// read and written concurrently. Callers uphold the single-producer/
// single-consumer discipline (the dispatcher owns the producer side, the
// checker thread the consumer side).
unsafe impl<T: Copy + Send> Sync for SpscRing<T> {}
unsafe impl<T: Copy + Send> Send for SpscRing<T> {}

impl<T: Copy> SpscRing<T> {
    /// Create a ring holding `capacity` elements. A non-power-of-two
    /// request is rounded down, matching the classic fifo behavior.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity >= 2, "ring capacity must be at least 2");
        let capacity = if capacity.is_power_of_two() {
            capacity
        } else {
            capacity.next_power_of_two() / 2
        };
        assert!(capacity <= u32::MAX as usize / 2);

        let buf = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        SpscRing {
            in_count: AtomicU32::new(0),
            out_count: AtomicU32::new(0),
            mask: capacity as u32 - 1,
            buf,
        }
    }

    pub fn capacity(&self) -> usize {
        self.mask as usize + 1
    }

    /// Elements currently queued
    pub fn len(&self) -> usize {
        let in_ = self.in_count.load(Ordering::Acquire);
        let out = self.out_count.load(Ordering::Acquire);
        in_.wrapping_sub(out) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Producer side: enqueue as many of `items` as fit.
    ///
    /// Returns the number actually stored: 0 when full, `items.len()` when
    /// everything fit, and a clamped count in between (the tail of `items`
    /// is dropped).
    pub fn put(&self, items: &[T]) -> usize {
        let in_ = self.in_count.load(Ordering::Relaxed);
        let out = self.out_count.load(Ordering::Acquire);
        let avail = self.capacity() - in_.wrapping_sub(out) as usize;
        if avail == 0 {
            return 0;
        }

        let n = items.len().min(avail);
        for (i, item) in items.iter().take(n).enumerate() {
            let idx = (in_.wrapping_add(i as u32) & self.mask) as usize;
            // SAFETY: slots in [in, in + avail) are not visible to the
            // consumer until the Release store below.
            unsafe { (*self.buf[idx].get()).write(*item) };
        }

        self.in_count
            .store(in_.wrapping_add(n as u32), Ordering::Release);
        n
    }

    /// Producer side: enqueue a single element. Returns false when full.
    pub fn push(&self, item: T) -> bool {
        self.put(std::slice::from_ref(&item)) == 1
    }

    /// Consumer side: dequeue up to `dst.len()` elements, in FIFO order.
    pub fn get(&self, dst: &mut [T]) -> usize {
        let out = self.out_count.load(Ordering::Relaxed);
        let in_ = self.in_count.load(Ordering::Acquire);
        let used = in_.wrapping_sub(out) as usize;
        if used == 0 {
            return 0;
        }

        let n = dst.len().min(used);
        for (i, slot) in dst.iter_mut().take(n).enumerate() {
            let idx = (out.wrapping_add(i as u32) & self.mask) as usize;
            // SAFETY: the Acquire load of `in` above makes the producer's
            // writes to these slots visible.
            *slot = unsafe { (*self.buf[idx].get()).assume_init() };
        }

        self.out_count
            .store(out.wrapping_add(n as u32), Ordering::Release);
        n
    }

    /// Consumer side: dequeue a single element.
    pub fn pop(&self) -> Option<T> {
        let out = self.out_count.load(Ordering::Relaxed);
        let in_ = self.in_count.load(Ordering::Acquire);
        if in_ == out {
            return None;
        }
        let idx = (out & self.mask) as usize;
        // SAFETY: the Acquire load of `in` makes the producer's write to
        // this slot visible.
        let value = unsafe { (*self.buf[idx].get()).assume_init() };
        self.out_count
            .store(out.wrapping_add(1), Ordering::Release);
        Some(value)
    }

    /// Reset both counters.
    ///
    /// Only valid while no producer or consumer is attached, i.e. when a
    /// queue slot is being recycled for a new thread.
    pub fn reset(&self) {
        self.in_count.store(0, Ordering::Relaxed);
        self.out_count.store(0, Ordering::Relaxed);
    }
}
