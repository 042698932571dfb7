//! End-to-end bridge scenarios: declare, submit, drain, reply, tear down
//!
//! These run the full path a transport would drive: queries routed through
//! a session into a bounded channel, drained by a consumer thread, answered
//! through the one-shot reply capability.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use confab_core::{
    channel, Config, Error, KeyExpr, Parameters, Payload, QueryHandler, ReplyReceiver, Session,
};

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

fn open_test_session() -> Session {
    Session::open(Config::default()).expect("default config opens")
}

fn demo_key() -> KeyExpr {
    KeyExpr::new("demo/test").expect("valid key expression")
}

fn submit(session: &Session, key: &KeyExpr, payload: Option<Payload>) -> ReplyReceiver {
    session
        .query(key, Parameters::empty(), payload)
        .expect("session is open")
}

// ----------------------------------------------------------------------------
// Round Trips
// ----------------------------------------------------------------------------

#[test]
fn test_query_reply_round_trip() {
    let session = open_test_session();
    let key = demo_key();
    let (tx, rx) = channel::bounded(4).unwrap();
    let _queryable = session.declare_queryable(&key, tx).unwrap();

    let receiver = session
        .query(&key, Parameters::from("kind=greeting"), Some(Payload::from("hello")))
        .unwrap();

    let query = rx.recv().expect("query was enqueued");
    assert_eq!(query.key_expr(), &key);
    assert_eq!(query.selector(), "demo/test?kind=greeting");
    assert_eq!(query.payload().map(Payload::as_bytes), Some(&b"hello"[..]));

    query.reply(key.clone(), Payload::from("world")).unwrap();
    let reply = receiver.recv().expect("reply arrived");
    assert_eq!(reply.payload().as_bytes(), b"world");
    assert_eq!(reply.key_expr(), &key);
    assert_eq!(reply.request_id(), query.request_id());
}

#[tokio::test]
async fn test_reply_receiver_async() {
    let session = open_test_session();
    let key = demo_key();
    let echo = key.clone();
    let _queryable = session
        .declare_queryable(
            &key,
            QueryHandler::from_fn(move |query| {
                let _ = query.reply(echo.clone(), "pong");
            }),
        )
        .unwrap();

    let receiver = session.query(&key, Parameters::empty(), None).unwrap();
    let reply = receiver.recv_async().await.expect("handler replied");
    assert_eq!(reply.payload().as_bytes(), b"pong");
}

// ----------------------------------------------------------------------------
// Backpressure
// ----------------------------------------------------------------------------

#[test]
fn test_capacity_one_end_to_end() {
    let session = open_test_session();
    let key = demo_key();
    let (tx, rx) = channel::bounded(1).unwrap();
    let queryable = session.declare_queryable(&key, tx).unwrap();

    let submitted = Arc::new(AtomicUsize::new(0));
    let producer = {
        let session = session.clone();
        let key = key.clone();
        let submitted = Arc::clone(&submitted);
        thread::spawn(move || {
            let mut receivers = Vec::new();
            for n in 0..2 {
                let payload = Payload::from(format!("query #{}", n));
                let receiver = session
                    .query(&key, Parameters::empty(), Some(payload))
                    .expect("session is open");
                submitted.fetch_add(1, Ordering::SeqCst);
                receivers.push(receiver);
            }
            receivers
        })
    };

    // Wait for the first submission to land, then give the second one time
    // to park. It fills the only slot; the next enqueue blocks its producer
    // until the consumer drains.
    let deadline = Instant::now() + Duration::from_secs(5);
    while submitted.load(Ordering::SeqCst) == 0 {
        assert!(Instant::now() < deadline, "first query never arrived");
        thread::sleep(Duration::from_millis(1));
    }
    thread::sleep(Duration::from_millis(100));
    assert_eq!(submitted.load(Ordering::SeqCst), 1);

    let first = rx.recv().expect("first query");
    first.reply(key.clone(), Payload::from("reply one")).unwrap();

    let second = rx.recv().expect("second query");
    second.reply(key.clone(), Payload::from("reply two")).unwrap();

    let receivers = producer.join().expect("producer finished");
    assert_eq!(submitted.load(Ordering::SeqCst), 2);

    let payloads: Vec<String> = receivers
        .into_iter()
        .map(|receiver| {
            let reply = receiver.recv().expect("both queries were answered");
            reply.payload().utf8_lossy().into_owned()
        })
        .collect();
    assert_eq!(payloads, ["reply one", "reply two"]);

    queryable.undeclare().unwrap();
}

// ----------------------------------------------------------------------------
// Teardown
// ----------------------------------------------------------------------------

#[test]
fn test_undeclare_then_close_unblocks_consumer() {
    let session = open_test_session();
    let key = demo_key();
    let (tx, rx) = channel::bounded(4).unwrap();
    let closer = tx.clone();
    let queryable = session.declare_queryable(&key, tx).unwrap();

    let consumer = thread::spawn(move || {
        let mut drained = 0;
        while let Some(query) = rx.recv() {
            drop(query);
            drained += 1;
        }
        drained
    });

    // Let the consumer park in recv before tearing down.
    thread::sleep(Duration::from_millis(50));
    queryable.undeclare().unwrap();
    closer.close();

    let drained = consumer.join().expect("consumer unblocked");
    assert_eq!(drained, 0);
}

#[test]
fn test_queued_queries_survive_undeclare_and_close() {
    let session = open_test_session();
    let key = demo_key();
    let (tx, rx) = channel::bounded(2).unwrap();
    let closer = tx.clone();
    let queryable = session.declare_queryable(&key, tx).unwrap();

    let first = submit(&session, &key, None);
    let second = submit(&session, &key, None);

    queryable.undeclare().unwrap();
    closer.close();

    // The reply path is independent of the registration; draining and
    // answering still works after teardown began.
    let mut answered = 0;
    while let Some(query) = rx.recv() {
        query
            .reply(key.clone(), Payload::from(format!("late #{}", answered)))
            .unwrap();
        answered += 1;
    }
    assert_eq!(answered, 2);

    assert_eq!(first.recv().unwrap().payload().as_bytes(), b"late #0");
    assert_eq!(second.recv().unwrap().payload().as_bytes(), b"late #1");
}

#[test]
fn test_queries_after_undeclare_do_not_route() {
    let session = open_test_session();
    let key = demo_key();
    let (tx, rx) = channel::bounded(4).unwrap();
    let queryable = session.declare_queryable(&key, tx).unwrap();
    queryable.undeclare().unwrap();

    let receiver = submit(&session, &key, None);
    assert!(receiver.recv().is_none());
    assert!(rx.is_empty());
}

// ----------------------------------------------------------------------------
// Reply Contract
// ----------------------------------------------------------------------------

#[test]
fn test_reply_reuse_fails_and_leaves_first_intact() {
    let session = open_test_session();
    let key = demo_key();
    let (tx, rx) = channel::bounded(1).unwrap();
    let _queryable = session.declare_queryable(&key, tx).unwrap();

    let receiver = submit(&session, &key, None);
    let query = rx.recv().unwrap();

    query.reply(key.clone(), Payload::from("only")).unwrap();
    let err = query.reply(key.clone(), Payload::from("again")).unwrap_err();
    assert!(matches!(err, Error::AlreadyReplied));

    assert_eq!(receiver.recv().unwrap().payload().as_bytes(), b"only");
}

#[test]
fn test_unanswered_query_resolves_none() {
    let session = open_test_session();
    let key = demo_key();
    let (tx, rx) = channel::bounded(1).unwrap();
    let _queryable = session.declare_queryable(&key, tx).unwrap();

    let receiver = submit(&session, &key, None);
    drop(rx.recv().unwrap());
    assert!(receiver.recv().is_none());
}

#[test]
fn test_zero_length_and_absent_payload_are_distinct() {
    let session = open_test_session();
    let key = demo_key();
    let (tx, rx) = channel::bounded(2).unwrap();
    let _queryable = session.declare_queryable(&key, tx).unwrap();

    let _r1 = submit(&session, &key, None);
    let _r2 = submit(&session, &key, Some(Payload::from(Vec::new())));

    let absent = rx.recv().unwrap();
    assert!(absent.payload().is_none());

    let empty = rx.recv().unwrap();
    let payload = empty.payload().expect("payload is present");
    assert!(payload.is_empty());
}

// ----------------------------------------------------------------------------
// Per-Query Failure Isolation
// ----------------------------------------------------------------------------

#[test]
fn test_reply_errors_do_not_affect_later_queries() {
    let session = open_test_session();
    let key = demo_key();
    let (tx, rx) = channel::bounded(4).unwrap();
    let _queryable = session.declare_queryable(&key, tx).unwrap();

    let first = submit(&session, &key, None);
    let second = submit(&session, &key, None);

    let query = rx.recv().unwrap();
    query.reply(key.clone(), Payload::from("one")).unwrap();
    assert!(query.reply(key.clone(), Payload::from("dup")).is_err());
    drop(query);

    // The misuse above is local to that query; the next one is unaffected.
    let query = rx.recv().unwrap();
    query.reply(key.clone(), Payload::from("two")).unwrap();

    assert_eq!(first.recv().unwrap().payload().as_bytes(), b"one");
    assert_eq!(second.recv().unwrap().payload().as_bytes(), b"two");
}
