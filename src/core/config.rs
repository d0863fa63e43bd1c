//! Tunables for the detector.
//!
//! The classic implementation hard-wired these as compile-time constants;
//! here everything that can vary at runtime is a builder-settable field and
//! only the sizes baked into record layouts stay `const`.

use std::time::Duration;

/// Frames captured per event. Part of the `Event` layout.
pub const DEPTH_BACKTRACE: usize = 5;

/// Bytes reserved for a thread name. Part of the `Event` layout.
pub const NAME_LEN: usize = 16;

/// Capacities and timing for the detector.
///
/// Every pool and map is sized from these values at startup; nothing grows
/// on the hot path. Exhausting a capacity is a configuration error, not a
/// runtime condition the detector tries to absorb.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Tick period of the checker thread (event drain + cycle scan)
    pub period: Duration,
    /// Maximum number of monitored threads
    pub max_threads: usize,
    /// Maximum number of monitored locks
    pub max_locks: usize,
    /// Per-thread event ring capacity; rounded down to a power of two
    pub ring_capacity: usize,
    /// Spin budget of the internal spinlocks before yielding
    pub spin_budget: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            period: Duration::from_millis(200),
            max_threads: 512,
            max_locks: 512,
            ring_capacity: 256,
            spin_budget: 2048,
        }
    }
}

impl DetectorConfig {
    /// Upper bound of live vertices: one per thread plus one per lock.
    pub fn vertex_capacity(&self) -> usize {
        self.max_threads + self.max_locks
    }

    /// Upper bound of live arcs: each thread contributes at most one wait
    /// arc and one hold arc.
    pub fn arc_capacity(&self) -> usize {
        2 * self.max_threads
    }
}
