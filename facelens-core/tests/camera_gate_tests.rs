//! Integration tests for the camera gate and background worker
//!
//! Open and close sequences are posted to the worker the way a camera
//! controller does it; the gate must keep them from interleaving.

use facelens_core::*;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_open_close_sequences_do_not_interleave() {
    let gate = Arc::new(CameraGate::new());
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut worker = BackgroundWorker::start("CameraBackground").unwrap();

    for round in 0..3 {
        for op in ["open", "close"] {
            let gate = gate.clone();
            let log = log.clone();
            worker
                .post(move || {
                    let guard = gate
                        .try_acquire_for(op, DEFAULT_GATE_TIMEOUT)
                        .expect("gate should be free");
                    log.lock().push(format!("{}-{}-begin", guard.operation(), round));
                    std::thread::sleep(Duration::from_millis(2));
                    log.lock().push(format!("{}-{}-end", guard.operation(), round));
                })
                .unwrap();
        }
    }

    worker.quit_safely().unwrap();

    let log = log.lock();
    assert_eq!(log.len(), 12);
    for pair in log.chunks(2) {
        let begin = pair[0].trim_end_matches("-begin");
        let end = pair[1].trim_end_matches("-end");
        assert_eq!(begin, end);
    }
    assert!(!gate.is_locked());
}

#[test]
fn test_close_from_other_thread_waits_for_open() {
    let gate = Arc::new(CameraGate::new());
    let worker = BackgroundWorker::start("CameraBackground").unwrap();

    let guard = gate.acquire("open");

    let contender = gate.clone();
    let rx = worker
        .submit(move || {
            contender
                .try_acquire_for("close", Duration::from_millis(500))
                .map(|guard| guard.operation().to_string())
        })
        .unwrap();

    std::thread::sleep(Duration::from_millis(20));
    drop(guard);

    let closed_by = rx.blocking_recv().unwrap().unwrap();
    assert_eq!(closed_by, "close");
}

#[tokio::test]
async fn test_manual_ticker_drives_totals() {
    let mut ticker = ManualTicker::stepped(33, 4);
    let mut totals = Vec::new();
    while let Some(tick) = ticker.next_tick().await {
        totals.push(tick.total_ms);
    }
    assert_eq!(totals, vec![0, 33, 66, 99]);
}
