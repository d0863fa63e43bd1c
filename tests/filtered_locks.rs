use gridlock::{TrackedMutex, filter};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
mod common;
use common::{NO_DEADLOCK_TIMEOUT, assert_no_deadlock, start_detector};

/// Filtering one of the two contested locks removes its edges from the
/// graph, so the classic two-thread deadlock never forms a cycle, even
/// though the threads really are stuck.
#[test]
fn filtered_lock_suppresses_detection() {
    let harness = start_detector();

    let mutex_a = Arc::new(TrackedMutex::new("Resource A"));
    let mutex_b = Arc::new(TrackedMutex::new("Resource B"));

    // register the filter before any monitored thread emits
    filter::create(&[mutex_b.id()]);
    assert!(filter::contains(mutex_b.id()));
    assert!(!filter::contains(mutex_a.id()));

    let a_clone = Arc::clone(&mutex_a);
    let b_clone = Arc::clone(&mutex_b);

    let _t1 = thread::spawn(move || {
        let _guard_a = mutex_a.lock();
        thread::sleep(Duration::from_millis(100));
        let _guard_b = mutex_b.lock();
    });

    let _t2 = thread::spawn(move || {
        let _guard_b = b_clone.lock();
        thread::sleep(Duration::from_millis(100));
        let _guard_a = a_clone.lock();
    });

    assert_no_deadlock(&harness, NO_DEADLOCK_TIMEOUT);
}
