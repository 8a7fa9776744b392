//! Promise and packaged-task end-to-end suite: producer/consumer pairing,
//! single completion, broken promises.

use awaitless::test_utils::init_test_logging;
use awaitless::{wait_for_all, when_all, ErrorKind, PackagedTask, Promise};
use std::time::Duration;

#[test]
fn value_set_from_another_thread_reaches_the_consumer() {
    init_test_logging();
    awaitless::test_phase!("value_set_from_another_thread_reaches_the_consumer");

    let mut promise = Promise::new();
    let future = promise.future().expect("future");

    let producer = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(10));
        promise.set_value(7).expect("set");
    });

    let value = future.get().expect("value");
    awaitless::assert_with_log!(value == 7, "promised value", 7, value);
    producer.join().expect("producer panicked");
    awaitless::test_complete!("value_set_from_another_thread_reaches_the_consumer");
}

#[test]
fn double_set_reports_already_satisfied() {
    init_test_logging();
    let promise = Promise::new();
    promise.set_value(1).expect("first");
    assert!(promise.set_value(2).expect_err("second").is_already_satisfied());
    assert!(promise
        .set_error(awaitless::Error::new(ErrorKind::Internal))
        .expect_err("error after value")
        .is_already_satisfied());
}

#[test]
fn dropping_the_producer_breaks_the_promise() {
    init_test_logging();
    let mut promise = Promise::<u32>::new();
    let future = promise.future().expect("future");
    drop(promise);
    assert!(future.get().expect_err("broken").is_broken_promise());
}

#[test]
fn promise_future_works_inside_combinators() {
    init_test_logging();
    let mut promise = Promise::new();
    let plain = promise.future().expect("future");

    let aggregate = when_all(vec![plain]);
    let producer = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(30));
        promise.set_value(123).expect("set");
    });

    let mut collected = aggregate.get().expect("aggregate");
    assert_eq!(collected.pop().expect("input").get().expect("value"), 123);
    producer.join().expect("producer panicked");
}

#[test]
fn packaged_task_completes_when_run_by_the_caller() {
    init_test_logging();
    let mut task = PackagedTask::new(|| String::from("packaged"));
    let future = task.future().expect("future");

    let runner = std::thread::spawn(move || {
        task.run().expect("run");
        task
    });

    assert_eq!(future.get().expect("value"), "packaged");
    let mut task = runner.join().expect("runner panicked");
    assert!(task.run().expect_err("second run").is_already_satisfied());
}

#[test]
fn waiting_blocks_on_unset_promises() {
    init_test_logging();
    let mut first = Promise::new();
    let mut second = Promise::new();
    let futures = vec![
        first.future().expect("first"),
        second.future().expect("second"),
    ];

    let producer = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        first.set_value(1).expect("set first");
        std::thread::sleep(Duration::from_millis(20));
        second.set_value(2).expect("set second");
    });

    wait_for_all(&futures);
    assert!(futures.iter().all(|f| f.is_ready()));
    producer.join().expect("producer panicked");
}
