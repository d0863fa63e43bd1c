//! Per-thread event production
//!
//! Each monitored thread owns a thread-local dispatcher holding its event
//! ring and a scratch event that is stamped and re-emitted for every lock
//! transition. The record is created lazily on the thread's first probe
//! call: it claims a queue slot from the shared table, resolves the thread's
//! identity once, and registers the queue so the checker thread will drain
//! it. The probe functions below are the whole interposition boundary: a
//! glue layer (or [`TrackedMutex`](crate::TrackedMutex)) calls them around
//! the host lock operations, and nothing here ever touches the graph.
//!
//! Overflow policy: a full ring drops the event rather than ever blocking
//! the application. To keep the consumed stream well-formed the dispatcher
//! then suppresses the rest of that lock's WAIT/HOLD/RELEASE trio; the
//! checker's tolerant repairs cover whatever still leaks through.

use crate::core::config::DEPTH_BACKTRACE;
use crate::core::detector::Runtime;
use crate::core::filter;
use crate::core::logger::{diag_err, diag_info, diag_warn};
use crate::core::ring::SpscRing;
use crate::core::types::{Event, EventKind, LockId, LockInfo, ThreadId, ThreadInfo};
use fxhash::FxHashSet;
use std::cell::RefCell;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// Fills `buf` with opaque frame identifiers, returning how many were
/// captured. Installed once at startup; the default leaves the frames
/// zeroed and detection proceeds without symbolic context.
pub type CaptureHook = fn(&mut [usize]) -> usize;

static CAPTURE: OnceLock<CaptureHook> = OnceLock::new();

// Thread ids are opaque in the report contract; a process-wide counter
// avoids relying on platform tid syscalls.
static NEXT_TID: AtomicUsize = AtomicUsize::new(1);

pub(crate) fn set_capture_hook(hook: CaptureHook) {
    let _ = CAPTURE.set(hook);
}

fn capture_backtrace(buf: &mut [usize; DEPTH_BACKTRACE]) {
    *buf = [0; DEPTH_BACKTRACE];
    if let Some(hook) = CAPTURE.get() {
        let _ = hook(buf);
    }
}

enum TlsState {
    Unclaimed,
    /// Queue slots were exhausted; this thread stays unmonitored
    Disabled,
    Ready(LocalDispatcher),
}

thread_local! {
    static DISPATCHER: RefCell<TlsState> = const { RefCell::new(TlsState::Unclaimed) };
}

struct LocalDispatcher {
    ring: &'static SpscRing<Event>,
    scratch: Event,
    /// Locks whose current trio is being suppressed after a drop
    lost: FxHashSet<LockId>,
}

impl LocalDispatcher {
    /// First-emission path: claim a queue slot, stamp identity, register.
    fn init(rt: &'static Runtime) -> Option<LocalDispatcher> {
        let tid: ThreadId = NEXT_TID.fetch_add(1, Ordering::Relaxed);

        let Some(ring) = rt.queues.claim(tid) else {
            diag_err!("queue slots exhausted; thread {tid} will not be monitored");
            rt.queues.dump();
            return None;
        };
        rt.thread_count.fetch_add(1, Ordering::Relaxed);

        let mut info = ThreadInfo::new(tid);
        match thread::current().name() {
            Some(name) => info.set_name(name),
            None => info.set_name(&format!("t{tid}")),
        }

        Some(LocalDispatcher {
            ring,
            scratch: Event {
                kind: EventKind::Wait,
                thread: info,
                lock: LockInfo { mid: 0 },
            },
            lost: FxHashSet::default(),
        })
    }

    fn emit_wait(&mut self, rt: &Runtime, mid: LockId) {
        // a fresh WAIT starts a new trio for this lock
        self.lost.remove(&mid);
        if !self.ring.push(self.scratch) {
            rt.note_drop();
            self.lost.insert(mid);
            diag_warn!("event ring full, dropping WAIT trio for lock {mid:#x}");
        }
    }

    fn emit_hold(&mut self, rt: &Runtime, mid: LockId) {
        if self.lost.contains(&mid) {
            return;
        }
        if !self.ring.push(self.scratch) {
            rt.note_drop();
            self.lost.insert(mid);
            diag_warn!("event ring full, dropping HOLD for lock {mid:#x}");
        }
    }

    fn emit_release(&mut self, rt: &Runtime, mid: LockId) {
        if self.lost.remove(&mid) {
            return;
        }
        if !self.ring.push(self.scratch) {
            rt.note_drop();
            diag_warn!("event ring full, dropping RELEASE for lock {mid:#x}");
        }
    }
}

impl Drop for LocalDispatcher {
    fn drop(&mut self) {
        // Exit notice so the checker can reap the vertex and recycle the
        // queue slot. A few retries; if the ring stays full the slot leaks,
        // which only costs capacity.
        let mut ev = self.scratch;
        ev.kind = EventKind::Exit;
        ev.lock.mid = 0;
        for _ in 0..8 {
            if self.ring.push(ev) {
                return;
            }
            thread::yield_now();
        }
        if let Some(rt) = Runtime::get() {
            rt.note_drop();
        }
    }
}

fn with_dispatcher(rt: &'static Runtime, f: impl FnOnce(&Runtime, &mut LocalDispatcher)) {
    // try_with: probes fired from destructors during thread teardown find
    // the TLS slot already gone and become no-ops
    let _ = DISPATCHER.try_with(|cell| {
        let mut state = cell.borrow_mut();
        if let TlsState::Unclaimed = &*state {
            *state = match LocalDispatcher::init(rt) {
                Some(d) => TlsState::Ready(d),
                None => TlsState::Disabled,
            };
        }
        if let TlsState::Ready(dispatcher) = &mut *state {
            f(rt, dispatcher);
        }
    });
}

/// Record that the current thread is about to block requesting `mid`.
///
/// Call immediately before the host lock's acquire.
pub fn on_wait(mid: LockId) {
    let Some(rt) = Runtime::get() else { return };
    if filter::contains(mid) {
        return;
    }
    with_dispatcher(rt, |rt, d| {
        d.scratch.kind = EventKind::Wait;
        d.scratch.lock.mid = mid;
        capture_backtrace(&mut d.scratch.thread.backtrace);
        diag_info!(
            "[{}] tid {} waits mid {:#x}",
            d.scratch.thread.name_str(),
            d.scratch.thread.tid,
            mid
        );
        d.emit_wait(rt, mid);
    });
}

/// Record that the current thread acquired `mid`.
///
/// Call immediately after the host lock's acquire returns. The backtrace
/// captured at the WAIT is still accurate and is reused.
pub fn on_hold(mid: LockId) {
    let Some(rt) = Runtime::get() else { return };
    if filter::contains(mid) {
        return;
    }
    with_dispatcher(rt, |rt, d| {
        d.scratch.kind = EventKind::Hold;
        d.scratch.lock.mid = mid;
        diag_info!(
            "[{}] tid {} holds mid {:#x}",
            d.scratch.thread.name_str(),
            d.scratch.thread.tid,
            mid
        );
        d.emit_hold(rt, mid);
    });
}

/// Record that the current thread released `mid`.
///
/// Call after the host lock's release.
pub fn on_release(mid: LockId) {
    let Some(rt) = Runtime::get() else { return };
    if filter::contains(mid) {
        return;
    }
    with_dispatcher(rt, |rt, d| {
        d.scratch.kind = EventKind::Release;
        d.scratch.lock.mid = mid;
        capture_backtrace(&mut d.scratch.thread.backtrace);
        d.emit_release(rt, mid);
    });
}
