use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use soloop::{gather, run, sleep, wait_for, Error};

fn int_div(a: i32, b: i32) -> impl Future<Output = i32> {
    async move { a / b }
}

fn factorial(
    log: Rc<RefCell<Vec<&'static str>>>,
    name: &'static str,
    n: u32,
) -> impl Future<Output = u32> {
    async move {
        let mut result = 1;
        for i in 2..=n {
            sleep(Duration::from_millis(10)).await;
            result *= i;
        }
        log.borrow_mut().push(name);
        result
    }
}

#[test]
fn gather_returns_tuple_by_index() {
    let log = Rc::new(RefCell::new(Vec::new()));

    let inner = log.clone();
    run(async move {
        let (a, b, c, _unit) = gather((
            factorial(inner.clone(), "A", 2),
            factorial(inner.clone(), "B", 3),
            factorial(inner.clone(), "C", 4),
            async {},
        ))
        .await
        .expect("gather");

        assert_eq!(a, 2);
        assert_eq!(b, 6);
        assert_eq!(c, 24);
    })
    .unwrap();

    // Completion order follows the sleep counts, not tuple position.
    assert_eq!(*log.borrow(), vec!["A", "B", "C"]);
}

#[test]
fn gather_of_gather() {
    let log = Rc::new(RefCell::new(Vec::new()));

    let inner = log.clone();
    run(async move {
        let (ab, c) = gather((
            gather((
                factorial(inner.clone(), "A", 2),
                factorial(inner.clone(), "B", 3),
            )),
            factorial(inner.clone(), "C", 4),
        ))
        .await
        .expect("outer gather");

        let (a, b) = ab.expect("inner gather");
        assert_eq!(a, 2);
        assert_eq!(b, 6);
        assert_eq!(c, 24);
    })
    .unwrap();
}

#[test]
fn prebuilt_gather_can_be_awaited_later() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let detached = gather((
        factorial(log.clone(), "A", 2),
        factorial(log.clone(), "B", 3),
    ));

    run(async move {
        let (a, b) = detached.await.expect("gather");
        assert_eq!(a, 2);
        assert_eq!(b, 6);
    })
    .unwrap();
}

#[test]
fn gather_fails_fast_on_first_failure() {
    let log = Rc::new(RefCell::new(Vec::new()));

    let inner = log.clone();
    let result =
        run(async move { gather((int_div(4, 0), factorial(inner, "B", 3))).await }).unwrap();

    match result {
        Err(Error::TaskFailed(message)) => assert!(message.contains("divide by zero")),
        other => panic!("expected TaskFailed, got {other:?}"),
    }
}

#[test]
fn gather_within_deadline() {
    run(async {
        let all = gather((
            sleep(Duration::from_millis(10)),
            sleep(Duration::from_millis(20)),
            sleep(Duration::from_millis(30)),
        ));
        assert!(wait_for(all, Duration::from_millis(100)).await.is_ok());
    })
    .unwrap();
}

#[test]
fn gather_beyond_deadline_times_out() {
    run(async {
        let all = gather((
            sleep(Duration::from_millis(10)),
            sleep(Duration::from_millis(200)),
            sleep(Duration::from_millis(30)),
        ));
        let result = wait_for(all, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(Error::Timeout)));
    })
    .unwrap();
}
