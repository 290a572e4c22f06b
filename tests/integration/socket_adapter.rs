// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::future_not_send,
    clippy::missing_panics_doc
)]

//! Integration tests for the named-socket adapter against a live relay.
//!
//! Validates:
//! - open → opened, send → message echoed back through the relay
//! - late sockets receive the room history on open
//! - exactly one terminal event per socket, after which the name is reusable
//! - reopening a live name closes the old socket without disturbing the new one
//! - the stdio bridge speaks the same protocol over JSON lines

use std::time::Duration;

use roomcast::bridge;
use roomcast::sockets::{SUPERSEDED_REASON, SocketManager};
use roomcast_proto::frame::Frame;
use roomcast_proto::socket::{Meta, SocketEvent};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

/// Start the relay server in-process and return a ws:// URL.
async fn start_relay() -> (String, tokio::task::JoinHandle<()>) {
    let (addr, handle) = roomcast_relay::relay::start_server("127.0.0.1:0")
        .await
        .expect("failed to start relay server");
    (format!("ws://{addr}/"), handle)
}

fn tagged(tag: &str) -> Meta {
    Meta::from([("tag".to_string(), tag.to_string())])
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<SocketEvent>) -> SocketEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event timed out")
        .expect("event channel closed")
}

/// Receive events until one matches, returning it. Non-matching events are
/// collected into `skipped`.
async fn wait_for(
    rx: &mut mpsc::UnboundedReceiver<SocketEvent>,
    skipped: &mut Vec<SocketEvent>,
    pred: impl Fn(&SocketEvent) -> bool,
) -> SocketEvent {
    loop {
        let event = next_event(rx).await;
        if pred(&event) {
            return event;
        }
        skipped.push(event);
    }
}

fn message_text(event: &SocketEvent) -> serde_json::Value {
    match event {
        SocketEvent::Message {
            data: Frame::Text(text),
            ..
        } => serde_json::from_str(text).unwrap(),
        other => panic!("expected text message, got {other:?}"),
    }
}

#[tokio::test]
async fn open_send_and_receive_own_message() {
    let (url, _handle) = start_relay().await;
    let (mut manager, mut events) = SocketManager::new();

    manager.open("chat".to_string(), url.clone(), tagged("a"));
    assert_eq!(
        next_event(&mut events).await,
        SocketEvent::Opened {
            name: "chat".to_string(),
            meta: tagged("a"),
        }
    );

    manager.send("chat", &json!({"text": "hi"})).unwrap();
    let event = next_event(&mut events).await;
    assert_eq!(event.name(), "chat");
    let body = message_text(&event);
    assert_eq!(body["text"], "hi");
    assert!(body["timestamp"].is_u64());

    manager.close("chat").unwrap();
    let closed = next_event(&mut events).await;
    assert_eq!(
        closed,
        SocketEvent::Closed {
            name: "chat".to_string(),
            meta: tagged("a"),
            reason: String::new(),
        }
    );
    assert!(manager.is_empty());
}

#[tokio::test]
async fn late_socket_gets_history_and_name_is_reusable() {
    let (url, _handle) = start_relay().await;
    let (mut manager, mut events) = SocketManager::new();
    let mut skipped = Vec::new();

    manager.open("a".to_string(), url.clone(), tagged("a"));
    wait_for(&mut events, &mut skipped, |e| matches!(e, SocketEvent::Opened { .. })).await;
    manager.send("a", &json!("{\"text\":\"first\"}")).unwrap();
    let echoed = wait_for(&mut events, &mut skipped, |e| {
        matches!(e, SocketEvent::Message { .. })
    })
    .await;
    let stored = message_text(&echoed);

    manager.open("late".to_string(), url.clone(), tagged("late"));
    let replayed = wait_for(&mut events, &mut skipped, |e| {
        e.name() == "late" && matches!(e, SocketEvent::Message { .. })
    })
    .await;
    assert_eq!(message_text(&replayed), stored);

    // Close "a" and reuse its name; the new socket sees the same history.
    manager.close("a").unwrap();
    let terminal = wait_for(&mut events, &mut skipped, SocketEvent::is_terminal).await;
    assert_eq!(terminal.name(), "a");

    manager.open("a".to_string(), url, tagged("a2"));
    let replayed = wait_for(&mut events, &mut skipped, |e| {
        e.name() == "a" && matches!(e, SocketEvent::Message { .. })
    })
    .await;
    match &replayed {
        SocketEvent::Message { meta: m, .. } => assert_eq!(m, &tagged("a2")),
        other => panic!("expected Message, got {other:?}"),
    }
    assert_eq!(message_text(&replayed), stored);

    manager.shutdown().await;
}

#[tokio::test]
async fn reopening_a_live_name_supersedes_the_old_socket() {
    let (url, _handle) = start_relay().await;
    let (mut manager, mut events) = SocketManager::new();
    let mut skipped = Vec::new();

    manager.open("s".to_string(), url.clone(), tagged("old"));
    wait_for(&mut events, &mut skipped, |e| matches!(e, SocketEvent::Opened { .. })).await;

    manager.open("s".to_string(), url.clone(), tagged("new"));
    let old_closed = wait_for(&mut events, &mut skipped, |e| {
        matches!(e, SocketEvent::Closed { meta, .. } if meta == &tagged("old"))
    })
    .await;
    match old_closed {
        SocketEvent::Closed { reason, .. } => assert_eq!(reason, SUPERSEDED_REASON),
        other => panic!("expected Closed, got {other:?}"),
    }

    // The new socket survives the old one's teardown.
    assert!(manager.contains("s"));
    let new_opened = |e: &SocketEvent| {
        matches!(e, SocketEvent::Opened { meta, .. } if meta == &tagged("new"))
    };
    if !skipped.iter().any(new_opened) {
        wait_for(&mut events, &mut skipped, new_opened).await;
    }

    manager.send("s", &json!({"n": 1})).unwrap();
    let echoed = wait_for(&mut events, &mut skipped, |e| {
        matches!(e, SocketEvent::Message { .. })
    })
    .await;
    match &echoed {
        SocketEvent::Message { meta, .. } => assert_eq!(meta, &tagged("new")),
        other => panic!("expected Message, got {other:?}"),
    }

    manager.shutdown().await;
    let mut terminals = 0;
    while let Some(event) = events.recv().await {
        if event.is_terminal() {
            terminals += 1;
        }
    }
    assert_eq!(terminals, 1, "new socket must end with one terminal event");
}

async fn next_json_line(
    lines: &mut tokio::io::Lines<BufReader<tokio::io::DuplexStream>>,
) -> serde_json::Value {
    let line = tokio::time::timeout(Duration::from_secs(5), lines.next_line())
        .await
        .expect("bridge output timed out")
        .unwrap()
        .expect("bridge output ended");
    serde_json::from_str(&line).unwrap()
}

#[tokio::test]
async fn stdio_bridge_round_trip() {
    let (url, _handle) = start_relay().await;

    let (mut cmd_writer, cmd_reader) = tokio::io::duplex(4096);
    let (event_writer, event_reader) = tokio::io::duplex(4096);
    let bridge_task = tokio::spawn(bridge::run(BufReader::new(cmd_reader), event_writer));
    let mut lines = BufReader::new(event_reader).lines();

    let open = json!({"type": "open", "name": "chat", "url": url, "meta": {"room": "lobby"}});
    cmd_writer
        .write_all(format!("{open}\n").as_bytes())
        .await
        .unwrap();
    let opened = next_json_line(&mut lines).await;
    assert_eq!(
        opened,
        json!({"type": "opened", "name": "chat", "meta": {"room": "lobby"}})
    );

    cmd_writer
        .write_all(b"{\"type\":\"send\",\"name\":\"chat\",\"data\":{\"text\":\"hi\"}}\n")
        .await
        .unwrap();
    let message = next_json_line(&mut lines).await;
    assert_eq!(message["type"], "message");
    assert_eq!(message["meta"]["room"], "lobby");
    let body: serde_json::Value = serde_json::from_str(message["data"].as_str().unwrap()).unwrap();
    assert_eq!(body["text"], "hi");

    // EOF on the command stream closes the socket and ends the bridge.
    drop(cmd_writer);
    let closed = next_json_line(&mut lines).await;
    assert_eq!(closed["type"], "closed");
    assert_eq!(closed["name"], "chat");

    tokio::time::timeout(Duration::from_secs(5), bridge_task)
        .await
        .expect("bridge did not exit")
        .unwrap()
        .unwrap();
}
