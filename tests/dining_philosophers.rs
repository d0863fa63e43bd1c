use gridlock::TrackedMutex;
use rand::Rng;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
mod common;
use common::{DEADLOCK_TIMEOUT, expect_deadlock, start_detector};

const PHILOSOPHERS: usize = 5;

#[test]
fn dining_philosophers_form_one_big_cycle() {
    let harness = start_detector();

    let forks: Vec<_> = (0..PHILOSOPHERS)
        .map(|_| Arc::new(TrackedMutex::new(())))
        .collect();
    let seated = Arc::new(Barrier::new(PHILOSOPHERS));

    for i in 0..PHILOSOPHERS {
        let left = Arc::clone(&forks[i]);
        let right = Arc::clone(&forks[(i + 1) % PHILOSOPHERS]);
        let seated = Arc::clone(&seated);

        thread::Builder::new()
            .name(format!("philosopher-{i}"))
            .spawn(move || {
                let _left = left.lock();
                // everyone holds their left fork before anyone reaches right
                seated.wait();
                let jitter = rand::rng().random_range(1..20);
                thread::sleep(Duration::from_millis(jitter));
                let _right = right.lock();
            })
            .expect("failed to spawn philosopher");
    }

    let info = expect_deadlock(&harness, DEADLOCK_TIMEOUT);
    // a single component containing every thread and every fork
    assert_eq!(info.code, 1231);
    assert_eq!(info.scc_size, 2 * PHILOSOPHERS);
    assert_eq!(info.thread_cycle.len(), PHILOSOPHERS);
    assert_eq!(info.thread_waiting_for_locks.len(), PHILOSOPHERS);
}
