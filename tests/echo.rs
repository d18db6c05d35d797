use std::cell::RefCell;
use std::rc::Rc;

use soloop::{create_scheduled_task, open_connection, run, start_server};

#[test]
fn echo_round_trip() {
    let message = b"hello world!";

    let reply = run(async move {
        let server = start_server(
            |stream| async move {
                let data = stream.read(100).await.expect("server read");
                stream.write(&data).await.expect("server write");
            },
            "127.0.0.1",
            0,
        )
        .await
        .expect("start server");
        let port = server.local_addr().expect("local addr").port();

        let mut serving = create_scheduled_task(async move {
            let _ = server.serve_forever().await;
        });

        let stream = open_connection("127.0.0.1", port).await.expect("connect");
        stream.write(message).await.expect("client write");
        let reply = stream.read(100).await.expect("client read");

        serving.cancel();
        reply
    })
    .unwrap();

    assert_eq!(reply, message);
}

#[test]
fn server_handles_consecutive_clients() {
    let seen = Rc::new(RefCell::new(Vec::new()));

    let log = seen.clone();
    run(async move {
        let server = start_server(
            |stream| async move {
                let data = stream.read(100).await.expect("server read");
                stream.write(&data).await.expect("server write");
            },
            "127.0.0.1",
            0,
        )
        .await
        .expect("start server");
        let port = server.local_addr().expect("local addr").port();

        let mut serving = create_scheduled_task(async move {
            let _ = server.serve_forever().await;
        });

        for request in ["first", "second", "third"] {
            let stream = open_connection("127.0.0.1", port).await.expect("connect");
            stream.write(request.as_bytes()).await.expect("write");
            let reply = stream.read(100).await.expect("read");
            log.borrow_mut().push(String::from_utf8(reply).expect("utf8"));
        }

        serving.cancel();
    })
    .unwrap();

    assert_eq!(*seen.borrow(), vec!["first", "second", "third"]);
}

#[test]
fn read_to_end_sees_eof() {
    let payload: Vec<u8> = (0..9000u32).map(|i| (i % 251) as u8).collect();
    let received = Rc::new(RefCell::new(Vec::new()));
    let drained = Rc::new(std::cell::Cell::new(false));

    let sink = received.clone();
    let done = drained.clone();
    let expected = payload.clone();
    run(async move {
        let server = start_server(
            move |stream| {
                let sink = sink.clone();
                let done = done.clone();
                async move {
                    let data = stream.read_to_end().await.expect("server read_to_end");
                    *sink.borrow_mut() = data;
                    done.set(true);
                }
            },
            "127.0.0.1",
            0,
        )
        .await
        .expect("start server");
        let port = server.local_addr().expect("local addr").port();

        let mut serving = create_scheduled_task(async move {
            let _ = server.serve_forever().await;
        });

        {
            let mut stream = open_connection("127.0.0.1", port).await.expect("connect");
            stream.write(&expected).await.expect("client write");
            // Closing the socket delivers EOF to the handler.
            stream.close();
        }

        // Let the handler drain the connection before stopping the server.
        while !drained.get() {
            soloop::sleep(std::time::Duration::from_millis(1)).await;
        }

        serving.cancel();
    })
    .unwrap();

    assert_eq!(*received.borrow(), payload);
}
