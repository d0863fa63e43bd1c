use gridlock::{DeadlockInfo, Gridlock};
use std::sync::mpsc;
use std::time::Duration;

#[allow(dead_code)]
pub const DEADLOCK_TIMEOUT: Duration = Duration::from_secs(5);
#[allow(dead_code)]
pub const NO_DEADLOCK_TIMEOUT: Duration = Duration::from_millis(800);

pub struct DetectorHarness {
    pub rx: mpsc::Receiver<DeadlockInfo>,
}

/// Start the detector with a short tick period and a channel callback.
///
/// Each integration test binary runs exactly one scenario, because the
/// detector is process-global and can only be started once.
pub fn start_detector() -> DetectorHarness {
    let (tx, rx) = mpsc::channel::<DeadlockInfo>();

    Gridlock::new()
        .period(Duration::from_millis(50))
        .on_deadlock(move |info| {
            let _ = tx.send(info);
        })
        .start()
        .expect("failed to start detector");

    DetectorHarness { rx }
}

#[allow(dead_code)]
pub fn expect_deadlock(h: &DetectorHarness, timeout: Duration) -> DeadlockInfo {
    match h.rx.recv_timeout(timeout) {
        Ok(info) => info,
        Err(_) => panic!("no deadlock detected within {timeout:?}"),
    }
}

#[allow(dead_code)]
pub fn assert_no_deadlock(h: &DetectorHarness, timeout: Duration) {
    assert!(
        h.rx.recv_timeout(timeout).is_err(),
        "unexpected deadlock report"
    );
}
