mod common;

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};

use common::{Options, TestServer, REJECTED_INPUT};
use strcount_client::{ClientConfig, ClientError, ClientHandle};

#[tokio::test]
async fn test_count_trimmed_input() {
    let server = TestServer::start().await;
    let mut client = assert_ok!(ClientHandle::connect(1, &server.config()).await);

    let count = assert_ok!(client.count_string("  hello  ").await);
    assert_eq!(count, 5);
    assert_eq!(server.params(), vec![json!(["hello"])]);

    assert_ok!(client.close().await);
}

#[tokio::test]
async fn test_blank_input_sends_empty_string() {
    let server = TestServer::start().await;
    let mut client = assert_ok!(ClientHandle::connect(2, &server.config()).await);

    assert_eq!(assert_ok!(client.count_string("").await), 0);
    assert_eq!(assert_ok!(client.count_string(" \t ").await), 0);
    assert_eq!(server.params(), vec![json!([""]), json!([""])]);

    assert_ok!(client.close().await);
}

#[tokio::test]
async fn test_sequential_requests_on_one_client() {
    let server = TestServer::start().await;
    let mut client = assert_ok!(ClientHandle::connect(3, &server.config()).await);

    for len in 0..50usize {
        let input = "x".repeat(len);
        assert_eq!(assert_ok!(client.count_string(&input).await), len as i64);
    }
    assert_eq!(server.requests(), 50);
    assert_eq!(server.connections(), 1);

    assert_ok!(client.close().await);
}

#[tokio::test]
async fn test_rpc_error_leaves_client_usable() {
    let server = TestServer::start().await;
    let mut client = assert_ok!(ClientHandle::connect(4, &server.config()).await);

    match client.count_string(REJECTED_INPUT).await {
        Err(ClientError::Rpc { code, message }) => {
            assert_eq!(code, -32000);
            assert_eq!(message, "input rejected");
        }
        other => panic!("Expected RPC error, got {:?}", other),
    }

    assert_eq!(assert_ok!(client.count_string("abc").await), 3);
    assert_ok!(client.close().await);
}

#[tokio::test]
async fn test_notifications_reach_sink_without_resolving_calls() {
    let server = TestServer::start_with(Options {
        push_before_reply: true,
        ..Options::default()
    })
    .await;

    let (tx, mut pushes) = mpsc::unbounded_channel();
    let sink = move |method: &str, params: &Value| {
        let _ = tx.send((method.to_string(), params.clone()));
    };
    let mut client = assert_ok!(
        ClientHandle::connect_with_sink(5, &server.config(), Arc::new(sink)).await
    );

    assert_eq!(assert_ok!(client.count_string("four").await), 4);
    assert_eq!(assert_ok!(client.count_string("seven!!").await), 7);

    let (method, params) = pushes.recv().await.unwrap();
    assert_eq!(method, "Server.Received");
    assert_eq!(params, json!({"id": 1}));
    let (_, params) = pushes.recv().await.unwrap();
    assert_eq!(params, json!({"id": 2}));

    assert_ok!(client.close().await);
}

#[tokio::test]
async fn test_connect_to_unreachable_server() {
    let addr = common::unreachable_addr().await;
    let config = assert_ok!(ClientConfig::new(addr.to_string()));

    let err = assert_err!(ClientHandle::connect(6, &config).await);
    match err {
        ClientError::Connect { addr: failed, .. } => assert_eq!(failed, addr.to_string()),
        other => panic!("Expected connect error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_close_twice_and_use_after_close() {
    let server = TestServer::start().await;
    let mut client = assert_ok!(ClientHandle::connect(7, &server.config()).await);
    assert_eq!(client.id(), 7);
    assert_eq!(client.peer_addr(), server.addr);

    assert_ok!(client.close().await);
    assert_ok!(client.close().await);
    assert!(client.is_closed());
    assert!(client.session().is_closed());

    let err = assert_err!(client.count_string("late").await);
    assert!(matches!(err, ClientError::Cancelled));
    assert_eq!(server.requests(), 0);
}

#[tokio::test]
async fn test_drop_without_close_cancels_lifetime() {
    let server = TestServer::start().await;
    let client = assert_ok!(ClientHandle::connect(8, &server.config()).await);
    let lifetime = client.lifetime().clone();

    drop(client);
    assert!(lifetime.is_cancelled());
}
