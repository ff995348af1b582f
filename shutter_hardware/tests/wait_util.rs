use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;

use shutter_hardware::error::HwError;
use shutter_hardware::util::wait_until_with_timeout;
use shutter_traits::clock::test_clock::TestClock;
use shutter_traits::MonotonicClock;

#[test]
fn wait_until_success_path() {
    let ready = Arc::new(AtomicBool::new(false));
    let ready_bg = ready.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(3));
        ready_bg.store(true, Ordering::Relaxed);
    });

    let res = wait_until_with_timeout(
        || ready.load(Ordering::Relaxed),
        Duration::from_millis(500),
        Duration::from_micros(200),
        &MonotonicClock::new(),
    );
    assert!(res.is_ok(), "expected success, got {res:?}");
}

#[test]
fn wait_until_timeout_path() {
    let clock = TestClock::new();
    let err = wait_until_with_timeout(
        || false,
        Duration::from_millis(5),
        Duration::from_millis(1),
        &clock,
    )
    .expect_err("expected timeout error");

    match err {
        HwError::Timeout => {}
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(clock.elapsed(), Duration::from_millis(5));
}
