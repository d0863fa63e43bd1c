//! # Gridlock
//!
//! A runtime deadlock detector for multithreaded programs.
//!
//! Gridlock watches the mutual-exclusion locks of an application while it
//! runs. Every monitored thread publishes its lock transitions (WAIT,
//! HOLD, RELEASE) into a private lock-free ring; a dedicated checker
//! thread folds those streams into a bipartite thread↔lock wait-for graph
//! and periodically searches it for strongly connected components. Any
//! component with more than one vertex is a lock-ordering cycle: a
//! deadlock in progress, or a lock held across a wait-for cycle about to
//! become one.
//!
//! ## Overview
//!
//! Deadlocks are easy to write and miserable to reproduce. Instead of
//! post-mortem analysis, Gridlock reports cycles while the threads are
//! still stuck, with thread names, lock ids and (optionally) capture-hook
//! backtraces for every participant.
//!
//! - **Allocation-free hot path**: event rings and graph records come from
//!   pools sized at startup; an application thread never allocates or
//!   blocks on the detector's behalf (a full ring drops the event instead).
//! - **Single-writer graph**: only the checker thread mutates the graph,
//!   so detection needs no locks around the core data structures.
//! - **Stable reports**: cycles render as the classic `==1001==` /
//!   `==1231==` stderr blocks, plus a structured [`DeadlockInfo`] through
//!   an asynchronous callback.
//!
//! ## Usage Example
//!
//! ```rust
//! use gridlock::{Gridlock, TrackedMutex};
//! use std::sync::Arc;
//! use std::thread;
//!
//! // Start the detector once, early in main
//! Gridlock::new()
//!     .on_deadlock(|info| {
//!         eprintln!("deadlock between threads {:?}", info.thread_cycle);
//!     })
//!     .start()
//!     .expect("failed to start detector");
//!
//! // Use TrackedMutex wherever a watched lock is wanted
//! let counter = Arc::new(TrackedMutex::new(0u64));
//! let handles: Vec<_> = (0..4)
//!     .map(|_| {
//!         let counter = Arc::clone(&counter);
//!         thread::spawn(move || {
//!             *counter.lock() += 1;
//!         })
//!     })
//!     .collect();
//! for h in handles {
//!     h.join().unwrap();
//! }
//! assert_eq!(*counter.lock(), 4);
//! ```
//!
//! Hosts that interpose a foreign lock API instead of wrapping a Rust
//! mutex call the [`probe`] functions directly around the original
//! acquire/release.

mod core;
pub use core::{
    DeadlockInfo, DetectorConfig, Gridlock, TrackedGuard, TrackedMutex, init, set_log_level,
    shutdown, stats,
    types::{Event, EventKind, LockId, LogLevel, Stats, ThreadId},
};

/// The raw interposition boundary.
///
/// A glue layer that intercepts a host lock API calls these around the
/// original operations: [`probe::on_wait`] before the acquire,
/// [`probe::on_hold`] after it returns, [`probe::on_release`] after the
/// release. [`TrackedMutex`] is exactly this wiring around
/// `parking_lot::Mutex`.
pub mod probe {
    pub use crate::core::dispatcher::{CaptureHook, on_hold, on_release, on_wait};
}

/// Lock filtering: exclude chosen lock ids from monitoring entirely.
pub mod filter {
    pub use crate::core::filter::{add, contains, create, destroy};
}
