//! The detector runtime
//!
//! One global [`Runtime`] holds everything the producer threads share: the
//! queue table, the counters, and the channel to the report dispatcher.
//! Two background threads are spawned at startup:
//!
//! - **gridlock-checker** owns the wait-for graph exclusively. Each tick it
//!   drains every registered event ring and, once per period, runs the SCC
//!   scan over the pending-request roots.
//! - **gridlock-report** receives structured [`DeadlockInfo`] values over a
//!   channel and runs the user callback, so a wedged application (the usual
//!   state when a deadlock fires) can never block reporting.

mod event_loop;
pub(crate) mod reporter;

pub(crate) use event_loop::GraphState;

use crate::core::config::DetectorConfig;
use crate::core::dispatcher::{CaptureHook, set_capture_hook};
use crate::core::logger::{EventLogger, diag_err};
use crate::core::ring::SpscRing;
use crate::core::spinlock::SpinLock;
use crate::core::types::{DeadlockInfo, Event, Stats, ThreadId};
use anyhow::{Context, Result, bail};
use crossbeam_channel::{Sender, unbounded};
use fxhash::FxHashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Global storage for the deadlock callback function
static CALLBACK: OnceLock<Arc<dyn Fn(DeadlockInfo) + Send + Sync>> = OnceLock::new();

/// Fixed table of event rings, one slot per monitored thread.
///
/// The rings themselves are preallocated so a thread's first emission never
/// allocates; claiming and releasing a slot moves an index through a
/// spinlock-guarded free list, mirroring the queue and buffer pools of the
/// classic design.
pub(crate) struct QueueTable {
    rings: Box<[SpscRing<Event>]>,
    state: SpinLock<TableState>,
}

struct TableState {
    free: Vec<u32>,
    by_thread: FxHashMap<ThreadId, u32>,
}

impl QueueTable {
    fn new(config: &DetectorConfig) -> Self {
        let rings = (0..config.max_threads)
            .map(|_| SpscRing::with_capacity(config.ring_capacity))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        QueueTable {
            rings,
            state: SpinLock::with_spin(
                TableState {
                    free: (0..config.max_threads as u32).rev().collect(),
                    by_thread: FxHashMap::with_capacity_and_hasher(
                        config.max_threads,
                        Default::default(),
                    ),
                },
                config.spin_budget,
            ),
        }
    }

    /// Claim a slot for `tid` and register its ring. `None` when every slot
    /// is taken. Registering a tid twice is an invariant violation and
    /// aborts: tids are handed out once per thread.
    pub(crate) fn claim(&self, tid: ThreadId) -> Option<&SpscRing<Event>> {
        let mut st = self.state.lock();
        let slot = st.free.pop()?;
        self.rings[slot as usize].reset();
        if st.by_thread.insert(tid, slot).is_some() {
            drop(st);
            diag_err!("thread {tid} registered an event queue twice");
            self.dump();
            std::process::abort();
        }
        Some(&self.rings[slot as usize])
    }

    /// Deregister `tid` and return its slot to the free list. The caller
    /// (the checker) guarantees the ring is drained and the producer gone.
    pub(crate) fn release(&self, tid: ThreadId) {
        let mut st = self.state.lock();
        if let Some(slot) = st.by_thread.remove(&tid) {
            st.free.push(slot);
        }
    }

    /// Copy the current registry into `out` (cleared first).
    pub(crate) fn snapshot(&self, out: &mut Vec<(ThreadId, u32)>) {
        out.clear();
        let st = self.state.lock();
        out.extend(st.by_thread.iter().map(|(&tid, &slot)| (tid, slot)));
    }

    pub(crate) fn ring(&self, slot: u32) -> &SpscRing<Event> {
        &self.rings[slot as usize]
    }

    /// Diagnostic dump of every registered queue.
    pub(crate) fn dump(&self) {
        let st = self.state.lock();
        eprintln!(
            "--->>-------- event queues: {} registered, {} slots free --------<<---",
            st.by_thread.len(),
            st.free.len()
        );
        eprintln!("{:>8} \t {:>5} \t {:>8} \t {:>8}", "tid", "slot", "queued", "capacity");
        for (&tid, &slot) in st.by_thread.iter() {
            let ring = &self.rings[slot as usize];
            eprintln!(
                "{:>8} \t {:>5} \t {:>8} \t {:>8}",
                tid,
                slot,
                ring.len(),
                ring.capacity()
            );
        }
    }
}

/// Everything the producers and the checker share.
pub(crate) struct Runtime {
    pub(crate) config: DetectorConfig,
    pub(crate) queues: QueueTable,
    pub(crate) thread_count: AtomicUsize,
    pub(crate) events_dropped: AtomicU64,
    pub(crate) repairs: AtomicU64,
    pub(crate) pending_gauge: AtomicUsize,
    pub(crate) reports_emitted: AtomicU64,
    pub(crate) stop: AtomicBool,
    pub(crate) report_tx: Sender<DeadlockInfo>,
    pub(crate) event_logger: Option<EventLogger>,
}

impl Runtime {
    pub(crate) fn get() -> Option<&'static Runtime> {
        RUNTIME.get()
    }

    pub(crate) fn note_drop(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }
}

/// Spawn the thread that runs user callbacks off the checker's back.
fn spawn_report_dispatcher() -> Result<Sender<DeadlockInfo>> {
    let (tx, rx) = unbounded::<DeadlockInfo>();

    thread::Builder::new()
        .name("gridlock-report".into())
        .spawn(move || {
            while let Ok(info) = rx.recv() {
                if let Some(cb) = CALLBACK.get() {
                    cb(info);
                }
            }
        })
        .context("failed to spawn report dispatcher")?;

    Ok(tx)
}

/// Bring the detector up: install callback and capture hook, allocate the
/// queue table, spawn the background threads.
pub(crate) fn init_detector(
    config: DetectorConfig,
    callback: Option<Box<dyn Fn(DeadlockInfo) + Send + Sync + 'static>>,
    event_logger: Option<EventLogger>,
    capture: Option<CaptureHook>,
) -> Result<()> {
    if config.max_threads == 0 || config.max_locks == 0 {
        bail!("capacities must be positive");
    }
    if config.ring_capacity < 2 {
        bail!("ring capacity must be at least 2");
    }
    if config.period.is_zero() {
        bail!("tick period must be positive");
    }
    if RUNTIME.get().is_some() {
        bail!("detector already initialized");
    }

    if let Some(cb) = callback {
        let cb: Arc<dyn Fn(DeadlockInfo) + Send + Sync> = Arc::from(cb);
        CALLBACK.set(cb).ok();
    }
    if let Some(hook) = capture {
        set_capture_hook(hook);
    }

    let report_tx = spawn_report_dispatcher()?;

    let runtime = Runtime {
        queues: QueueTable::new(&config),
        config,
        thread_count: AtomicUsize::new(0),
        events_dropped: AtomicU64::new(0),
        repairs: AtomicU64::new(0),
        pending_gauge: AtomicUsize::new(0),
        reports_emitted: AtomicU64::new(0),
        stop: AtomicBool::new(false),
        report_tx,
        event_logger,
    };

    if RUNTIME.set(runtime).is_err() {
        bail!("detector already initialized");
    }

    thread::Builder::new()
        .name("gridlock-checker".into())
        .spawn(checker_loop)
        .context("failed to spawn checker thread")?;

    Ok(())
}

/// The checker thread: drain every wakeup, scan once per period.
fn checker_loop() {
    let Some(rt) = Runtime::get() else { return };
    let mut state = GraphState::new(&rt.config);

    // let the application threads get going before the first sweep
    thread::sleep(Duration::from_millis(100));

    let mut pre = Instant::now();
    loop {
        if rt.stop.load(Ordering::Relaxed) {
            break;
        }

        state.drain(rt);

        let elapsed = pre.elapsed();
        if elapsed >= rt.config.period {
            state.scan_and_report(rt);
            pre = Instant::now();
        } else {
            thread::sleep(rt.config.period - elapsed);
        }
    }
}

/// Ask the checker to stop at its next tick boundary.
///
/// Probe calls after shutdown still enqueue events; nobody consumes them.
pub fn shutdown() {
    if let Some(rt) = Runtime::get() {
        rt.stop.store(true, Ordering::Relaxed);
    }
}

/// Snapshot of the detector counters. All zeros before initialization.
pub fn stats() -> Stats {
    match Runtime::get() {
        Some(rt) => Stats {
            events_dropped: rt.events_dropped.load(Ordering::Relaxed),
            repairs: rt.repairs.load(Ordering::Relaxed),
            pending_requests: rt.pending_gauge.load(Ordering::Relaxed),
            monitored_threads: rt.thread_count.load(Ordering::Relaxed),
            reports_emitted: rt.reports_emitted.load(Ordering::Relaxed),
        },
        None => Stats::default(),
    }
}
