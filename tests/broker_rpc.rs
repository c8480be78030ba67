//! End-to-end RPC tests against a live broker.
//!
//! All tests here need a RabbitMQ instance on localhost and are ignored
//! by default:
//!
//! ```text
//! cargo test -- --ignored
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use courier::broker::BrokerError;
use courier::envelope::{Request, Response};

mod common;

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker on localhost"]
async fn basic_rpc_round_trip() {
    let session = common::connect_session("test-service").await;
    common::start_echo_service(&session, "req.echo-target").await;

    let channel = session.create_channel().await.unwrap();
    let request = Request {
        method: "GET".into(),
        body: b"ping".to_vec(),
        response_queue: session.response_queue().unwrap(),
        ..Default::default()
    };

    let (reply_tx, reply_rx) = oneshot::channel();
    let id = session
        .send_request(
            &channel,
            "echo-target",
            request,
            Box::new(move |result| {
                let _ = reply_tx.send(result);
            }),
        )
        .await;
    assert!(!id.is_empty(), "an id is generated when none is supplied");

    let response = tokio::time::timeout(Duration::from_secs(1), reply_rx)
        .await
        .expect("response within a second")
        .unwrap()
        .unwrap();
    assert_eq!(response.body, b"ping");
    assert_eq!(response.request_id, id);
    assert_eq!(session.pending_requests(), 0);

    session.close().await;
}

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker on localhost"]
async fn parallel_requests_do_not_cross_talk() {
    let session = common::connect_session("parallel-tester").await;
    common::start_echo_service(&session, "req.parallel-target").await;

    let mut handles = Vec::new();
    for i in 0..100u32 {
        let session = session.clone();
        handles.push(tokio::spawn(async move {
            let channel = session.create_channel().await.unwrap();
            let request = Request {
                method: "GET".into(),
                body: i.to_string().into_bytes(),
                response_queue: session.response_queue().unwrap(),
                ..Default::default()
            };
            let (reply_tx, reply_rx) = oneshot::channel();
            session
                .send_request(
                    &channel,
                    "parallel-target",
                    request,
                    Box::new(move |result| {
                        let _ = reply_tx.send(result);
                    }),
                )
                .await;
            let response = tokio::time::timeout(Duration::from_secs(5), reply_rx)
                .await
                .expect("response within deadline")
                .unwrap()
                .unwrap();
            assert_eq!(response.body, i.to_string().into_bytes());
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(session.pending_requests(), 0);

    session.close().await;
}

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker on localhost"]
async fn missing_destination_reports_queue_not_found() {
    let session = common::connect_session("lost-caller").await;
    let channel = session.create_channel().await.unwrap();

    let (reply_tx, reply_rx) = oneshot::channel();
    session
        .send_request(
            &channel,
            "no-such-service",
            Request::default(),
            Box::new(move |result| {
                let _ = reply_tx.send(result);
            }),
        )
        .await;

    let err = reply_rx.await.unwrap().unwrap_err();
    match err {
        BrokerError::QueueNotFound { queue_name } => {
            assert_eq!(queue_name, "req.no-such-service");
        }
        other => panic!("expected queue_not_found, got {other:?}"),
    }

    session.close().await;
}

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker on localhost"]
async fn closed_channel_reports_unexpected() {
    let session = common::connect_session("closed-channel-caller").await;
    let channel = session.create_channel().await.unwrap();
    channel.close(200, "deliberately closed").await.unwrap();

    let (reply_tx, reply_rx) = oneshot::channel();
    session
        .send_request(
            &channel,
            "anything",
            Request::default(),
            Box::new(move |result| {
                let _ = reply_tx.send(result);
            }),
        )
        .await;

    let err = reply_rx.await.unwrap().unwrap_err();
    assert!(matches!(err, BrokerError::Unexpected(_)), "got {err:?}");

    session.close().await;
}

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker on localhost"]
async fn fire_and_forget_skips_the_registry() {
    let session = common::connect_session("forgetful-caller").await;
    common::declare_queue(&session, "req.sink-target").await;

    let channel = session.create_channel().await.unwrap();
    let request = Request {
        method: "POST".into(),
        body: b"drop me".to_vec(),
        // Cleared by send_and_forget even when set.
        response_queue: "resp.should-be-ignored".into(),
        ..Default::default()
    };
    session
        .send_and_forget(&channel, "sink-target", request)
        .await
        .unwrap();

    assert_eq!(session.pending_requests(), 0);

    session.close().await;
}

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker on localhost"]
async fn deadline_eviction_drops_the_late_response() {
    let session = common::connect_session("impatient-caller").await;
    // A queue nobody consumes: the request will sit there forever.
    common::declare_queue(&session, "req.dead-target").await;

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();

    let channel = session.create_channel().await.unwrap();
    let request = Request {
        method: "GET".into(),
        response_queue: session.response_queue().unwrap(),
        ..Default::default()
    };
    let id = session
        .send_request(
            &channel,
            "dead-target",
            request,
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .await;

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(session.pending_requests(), 1);

    // The caller's deadline elapses.
    session.evict(&id);
    assert_eq!(session.pending_requests(), 0);

    // A response arriving after eviction is dropped as unmatched.
    let late = Response {
        request_id: id,
        status_code: 200,
        headers: Vec::new(),
        body: b"too late".to_vec(),
    };
    let publisher = session.create_channel().await.unwrap();
    common::publish_raw(
        &publisher,
        &session.response_queue().unwrap(),
        &late.to_bytes(),
    )
    .await;

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0, "no spurious callback");

    session.close().await;
}
