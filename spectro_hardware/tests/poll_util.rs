use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;

use spectro_hardware::error::HwError;
use spectro_hardware::util::poll_until;

#[test]
fn poll_until_success_path() {
    let ready = Arc::new(AtomicBool::new(false));
    let ready_bg = ready.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(3));
        ready_bg.store(true, Ordering::Relaxed);
    });

    let res = poll_until(
        || Ok(ready.load(Ordering::Relaxed)),
        Duration::from_millis(200),
        Duration::from_micros(200),
    );
    assert!(res.is_ok(), "expected success, got {res:?}");
}

#[test]
fn poll_until_timeout_path() {
    let err = poll_until(
        || Ok(false),
        Duration::from_millis(5),
        Duration::from_micros(200),
    )
    .expect_err("expected timeout error");

    match err {
        HwError::Timeout => {}
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn poll_until_propagates_probe_errors() {
    let err = poll_until(
        || Err(HwError::I2c("nack".into())),
        Duration::from_millis(50),
        Duration::from_micros(200),
    )
    .expect_err("probe error should end the wait");
    assert!(matches!(err, HwError::I2c(_)));
}
