//! Black-box coverage of the `Promise`/`Future` contract through the crate's
//! public surface only.
mod common;

use std::thread;
use std::time::Duration;

use assert_matches::assert_matches;
use asyncio_core::{Error, Promise};

#[test]
fn set_is_visible_to_an_independently_held_future() {
    common::init_tracing();

    let promise = Promise::new();
    let future = promise.future().unwrap();

    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        promise.set(String::from("payload")).unwrap();
    });

    assert_eq!(future.get().unwrap(), "payload");
    handle.join().unwrap();
}

#[test]
fn setting_twice_is_rejected() {
    common::init_tracing();

    let promise = Promise::new();
    promise.set(1u32).unwrap();
    assert_matches!(promise.set(2u32), Err(Error::AlreadySet));
}

#[test]
fn vending_a_second_future_is_rejected() {
    common::init_tracing();

    let promise: Promise<u32> = Promise::new();
    let _first = promise.future().unwrap();
    assert_matches!(promise.future(), Err(Error::FutureAlreadyVended));
}

#[test]
fn a_promise_dropped_without_setting_abandons_its_future() {
    common::init_tracing();

    let promise: Promise<u32> = Promise::new();
    let future = promise.future().unwrap();
    drop(promise);
    assert_matches!(future.get(), Err(Error::Abandoned));
}

#[test]
fn consuming_the_value_twice_fails_the_second_time() {
    common::init_tracing();

    let promise = Promise::new();
    let future = promise.future().unwrap();
    promise.set(9u32).unwrap();
    assert_eq!(future.get().unwrap(), 9);
    assert_matches!(future.get(), Err(Error::Consumed));
}
