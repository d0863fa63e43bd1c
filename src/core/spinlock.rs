//! Test-and-set spinlock with bounded backoff
//!
//! Only the producer-facing shared state (queue slot allocation and the
//! thread→queue registry) is guarded by this lock, so the critical sections
//! are a handful of map operations. Acquisition spins with an exponential
//! backoff up to the configured budget, then yields to the scheduler and
//! retries.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

pub struct SpinLock<T> {
    locked: AtomicBool,
    spin: u32,
    data: UnsafeCell<T>,
}

// SAFETY: the lock guarantees exclusive access to `data`; `T: Send` is all
// that is required to move the protected value between threads.
unsafe impl<T: Send> Sync for SpinLock<T> {}
unsafe impl<T: Send> Send for SpinLock<T> {}

/// RAII guard for a held [`SpinLock`]
pub struct SpinGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> SpinLock<T> {
    pub const fn new(value: T) -> Self {
        Self::with_spin(value, 2048)
    }

    /// `spin` bounds the busy-wait backoff before the acquirer yields.
    pub const fn with_spin(value: T, spin: u32) -> Self {
        SpinLock {
            locked: AtomicBool::new(false),
            spin: if spin < 2 { 2 } else { spin },
            data: UnsafeCell::new(value),
        }
    }

    pub fn lock(&self) -> SpinGuard<'_, T> {
        loop {
            if !self.locked.swap(true, Ordering::Acquire) {
                return SpinGuard { lock: self };
            }

            // backoff
            let mut n = 1u32;
            while n < self.spin {
                std::hint::spin_loop();
                n <<= 1;
            }

            if !self.locked.swap(true, Ordering::Acquire) {
                return SpinGuard { lock: self };
            }

            thread::yield_now();
        }
    }
}

impl<T> Deref for SpinGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard proves the lock is held.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SpinGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard proves the lock is held.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SpinGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_are_exclusive() {
        let lock = SpinLock::new(0u64);

        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..10_000 {
                        *lock.lock() += 1;
                    }
                });
            }
        });

        assert_eq!(*lock.lock(), 80_000);
    }

    #[test]
    fn guard_releases_on_drop() {
        let lock = SpinLock::new(5);
        {
            let mut g = lock.lock();
            *g = 7;
        }
        assert_eq!(*lock.lock(), 7);
    }
}
