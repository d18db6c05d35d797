use std::cell::RefCell;
use std::rc::Rc;

use soloop::{dump_callstack, run, Error, Task};

fn depth_chain(n: u32, log: Rc<RefCell<Vec<u32>>>) -> Task<()> {
    Task::new(async move {
        log.borrow_mut().push(n);
        if n > 0 {
            depth_chain(n - 1, log.clone()).await.expect("child task");
            log.borrow_mut().push(n * 10);
        }
    })
}

#[test]
fn simple_await() {
    let log = Rc::new(RefCell::new(Vec::new()));
    run(depth_chain(0, log.clone())).unwrap().unwrap();
    assert_eq!(*log.borrow(), vec![0]);
}

#[test]
fn nested_await() {
    let log = Rc::new(RefCell::new(Vec::new()));
    run(depth_chain(1, log.clone())).unwrap().unwrap();
    assert_eq!(*log.borrow(), vec![1, 0, 10]);
}

#[test]
fn deep_await_chain() {
    let log = Rc::new(RefCell::new(Vec::new()));
    run(depth_chain(4, log.clone())).unwrap().unwrap();
    assert_eq!(*log.borrow(), vec![4, 3, 2, 1, 0, 10, 20, 30, 40]);
}

fn square(x: i64) -> Task<i64> {
    Task::new(async move { x * x })
}

#[test]
fn await_returns_value() {
    let result = run(async {
        let tx = square(3);
        let x2 = tx.await.expect("square(3)");
        let y2 = square(4).await.expect("square(4)");
        x2 + y2
    });
    assert_eq!(result.unwrap(), 25);
}

fn fib(n: u64) -> Task<u64> {
    Task::new(async move {
        if n <= 1 {
            return n;
        }
        let a = fib(n - 1).await.expect("fib child");
        let b = fib(n - 2).await.expect("fib child");
        a + b
    })
}

#[test]
fn recursive_task() {
    assert_eq!(run(fib(0)).unwrap().unwrap(), 0);
    assert_eq!(run(fib(1)).unwrap().unwrap(), 1);
    assert_eq!(run(fib(2)).unwrap().unwrap(), 1);
    assert_eq!(run(fib(12)).unwrap().unwrap(), 144);
}

#[test]
fn await_in_loop() {
    let result = run(async {
        let mut result: i64 = 1;
        let mut sign = -1;
        for i in 2..=10i64 {
            result += square(i).await.expect("square") * sign;
            sign *= -1;
        }
        result
    });
    assert_eq!(result.unwrap(), -55);
}

fn int_div(a: i32, b: i32) -> Task<i32> {
    Task::new(async move { a / b })
}

#[test]
fn task_panic_is_captured_at_await() {
    let result = run(async { int_div(4, 0).await }).unwrap();

    match result {
        Err(Error::TaskFailed(message)) => assert!(message.contains("divide by zero")),
        other => panic!("expected TaskFailed, got {other:?}"),
    }
}

#[test]
fn pending_main_task_has_no_result() {
    // Nothing ever schedules the main task again, so the loop drains and
    // reading the result reports the empty slot.
    let result = run(async { std::future::pending::<()>().await });
    assert!(matches!(result, Err(Error::NoResult)));
}

#[test]
fn callstack_dump_does_not_suspend() {
    let order = Rc::new(RefCell::new(Vec::new()));
    let inner_order = order.clone();
    run(async move {
        inner_order.borrow_mut().push(1);
        Task::new(async {
            dump_callstack().await;
        })
        .await
        .expect("dump task");
        inner_order.borrow_mut().push(2);
    })
    .unwrap();
    assert_eq!(*order.borrow(), vec![1, 2]);
}
