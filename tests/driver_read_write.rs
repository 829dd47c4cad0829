//! Black-box coverage of `Driver::read`/`write` over real pipe descriptors.
mod common;

use std::io::Read;
use std::os::unix::io::FromRawFd;
use std::time::Duration;

use assert_matches::assert_matches;
use asyncio_core::{Descriptor, Driver, DriverConfig, Error};

fn read_all(fd: Descriptor) -> Vec<u8> {
    let mut file = unsafe { std::fs::File::from_raw_fd(fd) };
    let mut buf = Vec::new();
    let _ = file.read_to_end(&mut buf);
    std::mem::forget(file);
    buf
}

fn test_driver() -> Driver {
    Driver::with_config(DriverConfig {
        threads: 3,
        poll_timeout_ms: 50,
        close_on_teardown: false,
    })
    .unwrap()
}

#[test]
fn a_single_read_completes_with_the_bytes_already_buffered() {
    common::init_tracing();

    let driver = test_driver();
    let (r, w) = nix::unistd::pipe().unwrap();
    nix::unistd::write(w, b"end to end").unwrap();

    let future = driver.read(r, read_all).unwrap();
    assert_eq!(future.get().unwrap(), b"end to end".to_vec());

    let _ = nix::unistd::close(w);
}

#[test]
fn two_reads_on_distinct_descriptors_resolve_independently() {
    common::init_tracing();

    let driver = test_driver();
    let (r1, w1) = nix::unistd::pipe().unwrap();
    let (r2, w2) = nix::unistd::pipe().unwrap();

    let f1 = driver.read(r1, read_all).unwrap();
    let f2 = driver.read(r2, read_all).unwrap();

    nix::unistd::write(w1, b"first").unwrap();
    nix::unistd::write(w2, b"second").unwrap();

    assert_eq!(f1.get().unwrap(), b"first".to_vec());
    assert_eq!(f2.get().unwrap(), b"second".to_vec());

    let _ = nix::unistd::close(w1);
    let _ = nix::unistd::close(w2);
}

#[test]
fn write_subscriptions_run_the_handler_exactly_once() {
    common::init_tracing();

    let driver = test_driver();
    let (r, w) = nix::unistd::pipe().unwrap();

    driver
        .write(w, |fd| nix::unistd::write(fd, b"written").unwrap())
        .unwrap();

    std::thread::sleep(Duration::from_millis(150));
    let mut buf = [0u8; 7];
    let n = nix::unistd::read(r, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"written");

    let _ = nix::unistd::close(r);
}

#[test]
fn driver_teardown_runs_pending_reads_to_completion_before_the_pool_joins() {
    common::init_tracing();

    let driver = test_driver();
    let (r, w) = nix::unistd::pipe().unwrap();
    nix::unistd::write(w, b"drained").unwrap();

    let future = driver.read(r, read_all).unwrap();
    // Give the reactor thread at least one poll round to observe the
    // already-readable descriptor before asking it to stop.
    std::thread::sleep(Duration::from_millis(100));
    drop(driver); // joins the reactor thread and the worker pool

    assert_eq!(future.get().unwrap(), b"drained".to_vec());
    let _ = nix::unistd::close(w);
}

#[test]
fn subscribing_a_negative_descriptor_is_rejected() {
    common::init_tracing();

    let driver = test_driver();
    let err = driver.read(-1, read_all).unwrap_err();
    assert_matches!(err, Error::InvalidDescriptor { fd: -1 });
}
