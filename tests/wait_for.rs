use std::cell::Cell;
use std::future::{pending, Future};
use std::rc::Rc;
use std::time::Duration;

use soloop::{run, sleep, wait_for, Error};

fn wait_duration(delay: Duration, called: Rc<Cell<bool>>) -> impl Future<Output = i64> {
    async move {
        sleep(delay).await;
        called.set(true);
        0xbaba_babc
    }
}

fn int_div(a: i32, b: i32) -> impl Future<Output = i32> {
    async move { a / b }
}

#[test]
fn completes_before_deadline() {
    let called = Rc::new(Cell::new(false));
    let inner = called.clone();

    let result = run(async move {
        wait_for(
            wait_duration(Duration::from_millis(12), inner),
            Duration::from_millis(120),
        )
        .await
    })
    .unwrap();

    assert_eq!(result.unwrap(), 0xbaba_babc);
    assert!(called.get());
}

#[test]
fn deadline_elapses_first() {
    let called = Rc::new(Cell::new(false));
    let inner = called.clone();

    let result = run(async move {
        wait_for(
            wait_duration(Duration::from_millis(200), inner),
            Duration::from_millis(100),
        )
        .await
    })
    .unwrap();

    assert!(matches!(result, Err(Error::Timeout)));
    // The wrapped future was cancelled mid-sleep and never finished.
    assert!(!called.get());
}

#[test]
fn prebuilt_wait_for_can_be_awaited_later() {
    let fast = wait_for(sleep(Duration::from_millis(30)), Duration::from_millis(50));

    run(async move {
        assert!(fast.await.is_ok());
        let slow = wait_for(sleep(Duration::from_millis(50)), Duration::from_millis(30));
        assert!(matches!(slow.await, Err(Error::Timeout)));
    })
    .unwrap();
}

#[test]
fn failure_passes_through_before_deadline() {
    let result = run(async { wait_for(int_div(5, 0), Duration::from_millis(100)).await }).unwrap();

    match result {
        Err(Error::TaskFailed(message)) => assert!(message.contains("divide by zero")),
        other => panic!("expected TaskFailed, got {other:?}"),
    }
}

#[test]
fn never_completing_future_times_out() {
    let result =
        run(async { wait_for(pending::<()>(), Duration::from_millis(50)).await }).unwrap();

    assert!(matches!(result, Err(Error::Timeout)));
}

#[test]
fn ticker_observes_cancellation_on_timeout() {
    fn ticker(count: Rc<Cell<u32>>) -> impl Future<Output = ()> {
        async move {
            while count.get() < 10 {
                sleep(Duration::from_millis(10)).await;
                count.set(count.get() + 1);
            }
        }
    }

    let short = Rc::new(Cell::new(0u32));
    let inner = short.clone();
    let result =
        run(async move { wait_for(ticker(inner), Duration::from_millis(15)).await }).unwrap();
    assert!(matches!(result, Err(Error::Timeout)));
    assert!(short.get() < 10);

    let full = Rc::new(Cell::new(0u32));
    let inner = full.clone();
    let result =
        run(async move { wait_for(ticker(inner), Duration::from_millis(400)).await }).unwrap();
    assert!(result.is_ok());
    assert_eq!(full.get(), 10);
}
