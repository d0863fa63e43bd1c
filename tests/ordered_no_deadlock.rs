use gridlock::TrackedMutex;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
mod common;
use common::{NO_DEADLOCK_TIMEOUT, assert_no_deadlock, start_detector};

/// Acquiring in one global order (and releasing in reverse) can never
/// produce a wait-for cycle, however hard the threads hammer the locks.
#[test]
fn globally_ordered_acquisition_never_reports() {
    let harness = start_detector();

    let locks: Vec<_> = (0..3).map(|_| Arc::new(TrackedMutex::new(0u64))).collect();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let locks = locks.clone();
            thread::spawn(move || {
                // modest volume so the rings never overflow; loss recovery
                // has its own scenario
                for _ in 0..10 {
                    let mut g0 = locks[0].lock();
                    let mut g1 = locks[1].lock();
                    let mut g2 = locks[2].lock();
                    *g0 += 1;
                    *g1 += 1;
                    *g2 += 1;
                    // guards drop in reverse declaration order: l2, l1, l0
                    thread::sleep(Duration::from_millis(1));
                }
            })
        })
        .collect();

    for h in handles {
        h.join().expect("worker panicked");
    }

    assert_no_deadlock(&harness, NO_DEADLOCK_TIMEOUT);

    // steady state: nobody is pending once the workers are done
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        if gridlock::stats().pending_requests == 0 {
            break;
        }
        assert!(
            Instant::now() < deadline,
            "pending requests never drained: {:?}",
            gridlock::stats()
        );
        thread::sleep(Duration::from_millis(20));
    }
}
