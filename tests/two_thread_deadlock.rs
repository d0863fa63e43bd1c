use gridlock::TrackedMutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
mod common;
use common::{DEADLOCK_TIMEOUT, expect_deadlock, start_detector};

#[test]
fn two_thread_deadlock_reports_a_four_cycle() {
    let harness = start_detector();

    let mutex_a = Arc::new(TrackedMutex::new("Resource A"));
    let mutex_b = Arc::new(TrackedMutex::new("Resource B"));
    let (id_a, id_b) = (mutex_a.id(), mutex_b.id());

    let a_clone = Arc::clone(&mutex_a);
    let b_clone = Arc::clone(&mutex_b);

    // Thread 1: lock A, then try to lock B
    let _t1 = thread::spawn(move || {
        let _guard_a = mutex_a.lock();

        // give thread 2 time to acquire lock B
        thread::sleep(Duration::from_millis(100));

        let _guard_b = mutex_b.lock();
        // never reached; the thread stays deadlocked
    });

    // Thread 2: lock B, then try to lock A
    let _t2 = thread::spawn(move || {
        let _guard_b = b_clone.lock();

        thread::sleep(Duration::from_millis(100));

        let _guard_a = a_clone.lock();
    });

    let info = expect_deadlock(&harness, DEADLOCK_TIMEOUT);
    // two threads and two locks alternate in the cycle
    assert_eq!(info.code, 1231);
    assert_eq!(info.scc_size, 4);
    assert_eq!(info.thread_cycle.len(), 2);
    assert_eq!(info.thread_waiting_for_locks.len(), 2);

    // the report names exactly the two contested locks
    let mut mids: Vec<_> = info
        .thread_waiting_for_locks
        .iter()
        .map(|&(_, mid)| mid)
        .collect();
    mids.sort_unstable();
    let mut expected = vec![id_a, id_b];
    expected.sort_unstable();
    assert_eq!(mids, expected);
}
