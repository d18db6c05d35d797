use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use soloop::time::loop_time;
use soloop::{create_scheduled_task, run, sleep, yield_now, Timed};

fn say_after(delay: Duration, calls: Rc<Cell<usize>>) -> impl std::future::Future<Output = ()> {
    async move {
        sleep(delay).await;
        calls.set(calls.get() + 1);
    }
}

#[test]
fn sleep_and_await_both() {
    let calls = Rc::new(Cell::new(0));
    let (c1, c2) = (calls.clone(), calls.clone());

    let before = loop_time();
    run(async move {
        let task1 = create_scheduled_task(say_after(Duration::from_millis(100), c1));
        let task2 = create_scheduled_task(say_after(Duration::from_millis(200), c2));
        task1.await.unwrap();
        task2.await.unwrap();
    })
    .unwrap();
    let elapsed = loop_time() - before;

    assert!(elapsed >= Duration::from_millis(200), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(300), "elapsed {elapsed:?}");
    assert_eq!(calls.get(), 2);
}

#[test]
fn sleep_and_cancel_second() {
    let calls = Rc::new(Cell::new(0));
    let (c1, c2) = (calls.clone(), calls.clone());

    let before = loop_time();
    run(async move {
        let task1 = create_scheduled_task(say_after(Duration::from_millis(100), c1));
        let mut task2 = create_scheduled_task(say_after(Duration::from_millis(200), c2));
        task1.await.unwrap();
        task2.cancel();
    })
    .unwrap();
    let elapsed = loop_time() - before;

    // The second timer is pruned instead of fired, so the loop exits early.
    assert!(elapsed >= Duration::from_millis(100), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(200), "elapsed {elapsed:?}");
    assert_eq!(calls.get(), 1);
}

#[test]
fn sleep_cancel_then_delay_exit() {
    let calls = Rc::new(Cell::new(0));
    let (c1, c2) = (calls.clone(), calls.clone());

    let before = loop_time();
    run(async move {
        let task1 = create_scheduled_task(say_after(Duration::from_millis(100), c1));
        let mut task2 = create_scheduled_task(say_after(Duration::from_millis(200), c2));
        task1.await.unwrap();
        task2.cancel();
        sleep(Duration::from_millis(200)).await;
    })
    .unwrap();
    let elapsed = loop_time() - before;

    assert!(elapsed >= Duration::from_millis(300), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(400), "elapsed {elapsed:?}");
    assert_eq!(calls.get(), 1);
}

#[test]
fn cancel_infinite_loop_task() {
    let count = Rc::new(Cell::new(0u32));

    let ticks = count.clone();
    run(async move {
        let inner = ticks.clone();
        let mut task = create_scheduled_task(async move {
            loop {
                inner.set(inner.get() + 1);
                sleep(Duration::from_millis(1)).await;
            }
        });
        sleep(Duration::from_millis(10)).await;
        task.cancel();
    })
    .unwrap();

    assert!(count.get() > 0);
    assert!(count.get() < 10);
}

#[test]
fn zero_delay_sleep_yields_to_ready_tasks() {
    let order = Rc::new(RefCell::new(Vec::new()));

    let log = order.clone();
    run(async move {
        let spawned = log.clone();
        let task = create_scheduled_task(async move {
            spawned.borrow_mut().push("spawned");
        });
        sleep(Duration::ZERO).await;
        log.borrow_mut().push("after sleep");
        task.await.unwrap();
    })
    .unwrap();

    assert_eq!(*order.borrow(), vec!["spawned", "after sleep"]);
}

#[test]
fn ready_queue_drains_in_fifo_order() {
    let order = Rc::new(RefCell::new(Vec::new()));

    let log = order.clone();
    run(async move {
        let (l1, l2) = (log.clone(), log.clone());
        let t1 = create_scheduled_task(async move { l1.borrow_mut().push(1) });
        let t2 = create_scheduled_task(async move { l2.borrow_mut().push(2) });
        // Everything enqueued during this tick runs on the next one, in
        // the order it was enqueued; the yielding task re-queued last.
        yield_now().await;
        log.borrow_mut().push(0);
        t1.await.unwrap();
        t2.await.unwrap();
    })
    .unwrap();

    assert_eq!(*order.borrow(), vec![1, 2, 0]);
}

#[test]
fn timed_wrapper_measures_sleep() {
    let ((), elapsed) = run(async {
        Timed::new(sleep(Duration::from_millis(50))).await
    })
    .unwrap();

    assert!(elapsed >= Duration::from_millis(50), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(150), "elapsed {elapsed:?}");
}
