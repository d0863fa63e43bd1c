use crate::core::dispatcher;
use crate::core::types::LockId;
use parking_lot::{Mutex, MutexGuard};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};

// Global counter for generating unique lock IDs
static NEXT_LOCK_ID: AtomicUsize = AtomicUsize::new(1);

/// A mutex wrapper that reports its lock transitions to the detector
///
/// `TrackedMutex` behaves like `parking_lot::Mutex`, but surrounds every
/// acquire and release with the detector's probe calls: WAIT before
/// blocking, HOLD once the lock is obtained, RELEASE when the guard drops.
/// It is the in-process stand-in for the dynamic-loader shims a C host
/// would install around `pthread_mutex_lock`/`unlock`.
///
/// # Example
///
/// ```rust
/// use gridlock::TrackedMutex;
/// use std::sync::Arc;
/// use std::thread;
///
/// let mutex = Arc::new(TrackedMutex::new(42));
/// let mutex_clone = Arc::clone(&mutex);
///
/// let handle = thread::spawn(move || {
///     let mut data = mutex_clone.lock();
///     *data += 1;
/// });
/// handle.join().unwrap();
///
/// assert_eq!(*mutex.lock(), 43);
/// ```
pub struct TrackedMutex<T> {
    /// Unique identifier for this mutex
    id: LockId,
    /// The wrapped mutex
    inner: Mutex<T>,
}

/// Guard for a [`TrackedMutex`]; reports the release when dropped
pub struct TrackedGuard<'a, T> {
    /// Lock that this guard is for
    lock_id: LockId,
    /// The inner MutexGuard
    guard: MutexGuard<'a, T>,
}

impl<T> TrackedMutex<T> {
    /// Create a new TrackedMutex with an automatically assigned ID
    pub fn new(value: T) -> Self {
        TrackedMutex {
            id: NEXT_LOCK_ID.fetch_add(1, Ordering::SeqCst),
            inner: Mutex::new(value),
        }
    }

    /// Get the ID of this mutex
    ///
    /// This is the identifier that appears in cycle reports and that the
    /// [`filter`](crate::filter) functions accept.
    pub fn id(&self) -> LockId {
        self.id
    }

    /// Acquire the lock, reporting the transition to the detector
    ///
    /// Emits WAIT before blocking and HOLD after the underlying acquire
    /// returns, exactly the window in which the detector may observe this
    /// thread as a pending request.
    pub fn lock(&self) -> TrackedGuard<'_, T> {
        dispatcher::on_wait(self.id);
        let guard = self.inner.lock();
        dispatcher::on_hold(self.id);
        TrackedGuard {
            lock_id: self.id,
            guard,
        }
    }

    /// Try to acquire the lock without blocking
    ///
    /// A failed attempt emits nothing: the thread never waits, so there is
    /// no transition for the detector to track. A successful attempt emits
    /// the WAIT/HOLD pair back to back.
    pub fn try_lock(&self) -> Option<TrackedGuard<'_, T>> {
        let guard = self.inner.try_lock()?;
        dispatcher::on_wait(self.id);
        dispatcher::on_hold(self.id);
        Some(TrackedGuard {
            lock_id: self.id,
            guard,
        })
    }
}

impl<T> Deref for TrackedGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.guard.deref()
    }
}

impl<T> DerefMut for TrackedGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.guard.deref_mut()
    }
}

impl<T> Drop for TrackedGuard<'_, T> {
    fn drop(&mut self) {
        // Report lock release
        dispatcher::on_release(self.lock_id);
    }
}
