//! Socket client behaviour against loopback peers
//!
//! Each failure mode must surface as its own error variant, and a consumer
//! that abandons a stream must release the connection.


use futures::StreamExt;
use specialist_router::protocol::MAX_LINE_BYTES;
use specialist_router::transport::{MessageOptions, SocketClient, SocketError, SpecialistTransport};
use std::time::{Duration, Instant};
use test_helpers::{closed_port, FakeBehavior, FakeSpecialist};

fn client() -> SocketClient {
    SocketClient::new(Duration::from_millis(500), Duration::from_secs(2))
}

fn lines(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_ping_round_trip() {
    let peer = FakeSpecialist::start(FakeBehavior::Reply(lines(&[r#"{"type":"pong"}"#]))).await;

    let reply = client()
        .ping("127.0.0.1", peer.port, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(reply.payload["type"], "pong");
    assert!(reply.elapsed < Duration::from_secs(1));
    assert_eq!(peer.requests().await, vec![r#"{"type":"ping"}"#.to_string()]);
}

#[tokio::test]
async fn test_ping_accepts_any_reply_line() {
    for reply in ["pong", r#"["pong"]"#, "42"] {
        let peer = FakeSpecialist::start(FakeBehavior::Reply(lines(&[reply]))).await;
        let result = client()
            .ping("127.0.0.1", peer.port, Duration::from_secs(1))
            .await;
        assert!(result.is_ok(), "reply {reply:?} gave {result:?}");
    }

    let peer = FakeSpecialist::start(FakeBehavior::Reply(lines(&["pong"]))).await;
    let reply = client()
        .ping("127.0.0.1", peer.port, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(reply.payload, serde_json::json!("pong"));
}

#[tokio::test]
async fn test_ping_silent_peer_times_out() {
    let peer = FakeSpecialist::start(FakeBehavior::Silent).await;

    let started = Instant::now();
    let result = client()
        .ping("127.0.0.1", peer.port, Duration::from_millis(300))
        .await;
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(SocketError::Timeout { .. })));
    assert!(elapsed >= Duration::from_millis(300));
    assert!(elapsed < Duration::from_millis(1000), "took {elapsed:?}");
    assert!(peer.wait_for_hang_up(Duration::from_secs(2)).await);
}

#[tokio::test]
async fn test_send_message_returns_content_and_model() {
    let peer = FakeSpecialist::start(FakeBehavior::Reply(lines(&[
        r#"{"content":"hello back","model":"llama3.3:70b"}"#,
    ])))
    .await;

    let options = MessageOptions {
        temperature: Some(0.3),
        ..Default::default()
    };
    let reply = client()
        .send_message("127.0.0.1", peer.port, "hello", &options)
        .await
        .unwrap();
    assert_eq!(reply.content, "hello back");
    assert_eq!(reply.model.as_deref(), Some("llama3.3:70b"));

    let request: serde_json::Value = serde_json::from_str(&peer.requests().await[0]).unwrap();
    assert_eq!(request["content"], "hello");
    assert!(request.get("stream").is_none());
}

#[tokio::test]
async fn test_legacy_response_field_is_accepted() {
    let peer =
        FakeSpecialist::start(FakeBehavior::Reply(lines(&[r#"{"response":"old style"}"#]))).await;
    let reply = client()
        .send_message("127.0.0.1", peer.port, "hi", &MessageOptions::default())
        .await
        .unwrap();
    assert_eq!(reply.content, "old style");
}

#[tokio::test]
async fn test_refused_connection_is_connection_error() {
    let port = closed_port().await;
    let result = client().ping("127.0.0.1", port, Duration::from_secs(1)).await;
    assert!(matches!(result, Err(SocketError::Connection { .. })));
}

#[tokio::test]
async fn test_silent_peer_times_out_and_connection_is_released() {
    let peer = FakeSpecialist::start(FakeBehavior::Silent).await;

    let started = Instant::now();
    let result = client()
        .send_message(
            "127.0.0.1",
            peer.port,
            "anyone there?",
            &MessageOptions::with_timeout(Duration::from_millis(150)),
        )
        .await;
    // Connecting, writing and waiting for the reply share one budget
    assert!(started.elapsed() < Duration::from_millis(800));
    assert!(matches!(result, Err(SocketError::Timeout { .. })));
    assert!(peer.wait_for_hang_up(Duration::from_secs(2)).await);
}

#[tokio::test]
async fn test_malformed_reply_is_protocol_error() {
    let peer = FakeSpecialist::start(FakeBehavior::Reply(lines(&["this is not json"]))).await;
    let result = client()
        .send_message("127.0.0.1", peer.port, "hi", &MessageOptions::default())
        .await;
    assert!(matches!(result, Err(SocketError::Protocol { .. })));
}

#[tokio::test]
async fn test_oversized_reply_line_is_protocol_error() {
    let huge = "a".repeat(MAX_LINE_BYTES + 1024);
    let peer = FakeSpecialist::start(FakeBehavior::ReplyAndHold {
        lines: vec![huge],
        pace: Duration::ZERO,
    })
    .await;

    let started = Instant::now();
    let result = client()
        .send_message(
            "127.0.0.1",
            peer.port,
            "hi",
            &MessageOptions::with_timeout(Duration::from_secs(10)),
        )
        .await;
    match result {
        Err(SocketError::Protocol { reason, .. }) => assert!(reason.contains("exceeds")),
        other => panic!("expected a protocol error, got {other:?}"),
    }
    // Rejected as soon as the limit is crossed, not when the timeout fires
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_reply_without_content_is_protocol_error() {
    let peer = FakeSpecialist::start(FakeBehavior::Reply(lines(&[r#"{"model":"x"}"#]))).await;
    let result = client()
        .send_message("127.0.0.1", peer.port, "hi", &MessageOptions::default())
        .await;
    assert!(matches!(result, Err(SocketError::Protocol { .. })));
}

#[tokio::test]
async fn test_error_reply_is_remote_error() {
    let peer = FakeSpecialist::start(FakeBehavior::Reply(lines(&[
        r#"{"type":"error","message":"model not loaded"}"#,
    ])))
    .await;
    let result = client()
        .send_message("127.0.0.1", peer.port, "hi", &MessageOptions::default())
        .await;
    assert!(matches!(
        result,
        Err(SocketError::Remote { message, .. }) if message == "model not loaded"
    ));
}

#[tokio::test]
async fn test_peer_closing_without_reply_is_peer_closed() {
    let peer = FakeSpecialist::start(FakeBehavior::Close).await;
    let result = client()
        .send_message("127.0.0.1", peer.port, "hi", &MessageOptions::default())
        .await;
    assert!(matches!(
        result,
        Err(SocketError::PeerClosed {
            chunks_received: 0,
            ..
        })
    ));
}

#[tokio::test]
async fn test_stream_yields_chunks_until_final() {
    let peer = FakeSpecialist::start(FakeBehavior::Reply(lines(&[
        r#"{"content":"Hel","is_final":false}"#,
        "",
        r#"{"content":"lo","is_final":false}"#,
        r#"{"content":"!","is_final":true,"metadata":{"model":"llama3.3:70b","total_tokens":3}}"#,
    ])))
    .await;

    let stream = client()
        .send_message_stream("127.0.0.1", peer.port, "greet", &MessageOptions::default())
        .await
        .unwrap();
    let (content, metadata) = stream.collect_content().await.unwrap();
    assert_eq!(content, "Hello!");
    let metadata = metadata.unwrap();
    assert_eq!(metadata.total_tokens, Some(3));

    let request: serde_json::Value = serde_json::from_str(&peer.requests().await[0]).unwrap();
    assert_eq!(request["stream"], true);
    assert!(request["request_id"].is_string());
}

#[tokio::test]
async fn test_stream_stall_after_first_chunk_is_stream_timeout() {
    let peer = FakeSpecialist::start(FakeBehavior::ReplyAndHold {
        lines: lines(&[r#"{"content":"partial","is_final":false}"#]),
        pace: Duration::ZERO,
    })
    .await;

    let mut stream = client()
        .send_message_stream(
            "127.0.0.1",
            peer.port,
            "slow",
            &MessageOptions::with_timeout(Duration::from_millis(200)),
        )
        .await
        .unwrap();

    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.content, "partial");
    let second = stream.next().await.unwrap();
    assert!(matches!(
        second,
        Err(SocketError::StreamTimeout {
            chunks_received: 1,
            ..
        })
    ));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_stream_silent_before_first_chunk_is_timeout() {
    let peer = FakeSpecialist::start(FakeBehavior::Silent).await;

    let mut stream = client()
        .send_message_stream(
            "127.0.0.1",
            peer.port,
            "hello?",
            &MessageOptions::with_timeout(Duration::from_millis(200)),
        )
        .await
        .unwrap();

    let first = stream.next().await.unwrap();
    assert!(matches!(first, Err(SocketError::Timeout { .. })));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_stream_closed_before_final_is_peer_closed() {
    let peer = FakeSpecialist::start(FakeBehavior::Reply(lines(&[
        r#"{"content":"a","is_final":false}"#,
    ])))
    .await;

    let stream = client()
        .send_message_stream("127.0.0.1", peer.port, "x", &MessageOptions::default())
        .await
        .unwrap();
    let error = stream.collect_content().await.unwrap_err();
    assert!(matches!(
        error,
        SocketError::PeerClosed {
            chunks_received: 1,
            ..
        }
    ));
}

#[tokio::test]
async fn test_dropping_stream_early_releases_connection() {
    let peer = FakeSpecialist::start(FakeBehavior::ReplyAndHold {
        lines: lines(&[
            r#"{"content":"one","is_final":false}"#,
            r#"{"content":"two","is_final":false}"#,
            r#"{"content":"three","is_final":true}"#,
        ]),
        pace: Duration::from_millis(50),
    })
    .await;

    let mut stream = client()
        .send_message_stream("127.0.0.1", peer.port, "count", &MessageOptions::default())
        .await
        .unwrap();
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.content, "one");
    drop(stream);

    assert!(peer.wait_for_hang_up(Duration::from_secs(2)).await);
}

#[tokio::test]
async fn test_stream_error_line_is_remote_error() {
    let peer = FakeSpecialist::start(FakeBehavior::Reply(lines(&[
        r#"{"type":"error","message":"context too long"}"#,
    ])))
    .await;

    let mut stream = client()
        .send_message_stream("127.0.0.1", peer.port, "x", &MessageOptions::default())
        .await
        .unwrap();
    let item = stream.next().await.unwrap();
    assert!(matches!(item, Err(SocketError::Remote { .. })));
    assert!(stream.next().await.is_none());
}
