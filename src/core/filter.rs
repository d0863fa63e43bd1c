//! Lock filter
//!
//! An allow-list of lock ids the probes skip entirely: no events are
//! emitted for a filtered lock, so it can never contribute vertices or arcs
//! to the wait-for graph. Intended to be configured before the monitored
//! threads start; the fast path is a single relaxed flag load when no
//! filter is installed.

use crate::core::types::LockId;
use fxhash::FxHashSet;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

static ENABLED: AtomicBool = AtomicBool::new(false);
static FILTERED: RwLock<Option<FxHashSet<LockId>>> = RwLock::new(None);

/// Install the filter set, replacing any previous one, and enable
/// filtering.
pub fn create(locks: &[LockId]) {
    let mut guard = FILTERED.write();
    *guard = Some(locks.iter().copied().collect());
    ENABLED.store(true, Ordering::Release);
}

/// Add a single lock to the filter set, creating it if necessary.
pub fn add(lock: LockId) {
    let mut guard = FILTERED.write();
    guard.get_or_insert_with(FxHashSet::default).insert(lock);
    ENABLED.store(true, Ordering::Release);
}

/// Tear the filter down; nothing is filtered afterwards.
pub fn destroy() {
    ENABLED.store(false, Ordering::Release);
    *FILTERED.write() = None;
}

/// Whether events for `lock` are currently suppressed.
pub fn contains(lock: LockId) -> bool {
    if !ENABLED.load(Ordering::Acquire) {
        return false;
    }
    FILTERED
        .read()
        .as_ref()
        .is_some_and(|set| set.contains(&lock))
}
