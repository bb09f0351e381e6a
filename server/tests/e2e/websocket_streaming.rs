//! End-to-end tests for WebSocket streaming
//! Tests: WebSocket connection -> streamed transcript updates -> utterances -> completion

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use server::build_router;
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use wiremock::MockServer;

use crate::common::*;

async fn spawn_server(upstream: &MockServer) -> SocketAddr {
    let app = build_router(test_state(upstream, None, test_config()));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn read_messages<S>(ws: &mut S) -> Vec<Value>
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let mut messages = Vec::new();
    loop {
        let next = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("websocket message");
        match next {
            Some(Ok(Message::Text(text))) => messages.push(serde_json::from_str(text.as_str()).unwrap()),
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
            Some(Ok(_)) => {}
        }
    }
    messages
}

#[tokio::test]
async fn test_websocket_streams_updates_in_order() {
    let upstream = MockServer::start().await;
    mount_reply(&upstream, sse_reply(&GREETING)).await;
    let addr = spawn_server(&upstream).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/relay/ws?prompt=Say%20hello"))
        .await
        .unwrap();
    let messages = read_messages(&mut ws).await;

    let kinds: Vec<&str> = messages.iter().map(|m| m["type"].as_str().unwrap()).collect();
    assert_eq!(kinds.first(), Some(&"opened"));
    assert_eq!(kinds.last(), Some(&"complete"));
    assert_eq!(kinds.iter().filter(|k| **k == "transcript").count(), 7);

    let utterances: Vec<&str> = messages
        .iter()
        .filter(|m| m["type"] == "utterance")
        .map(|m| m["text"].as_str().unwrap())
        .collect();
    assert_eq!(utterances, vec!["Hi there how are you doing", " today"]);
    assert_eq!(messages.last().unwrap()["reason"], "done");
}

#[tokio::test]
async fn test_websocket_cancel_message() {
    let upstream = MockServer::start().await;
    mount_slow_reply(&upstream, sse_reply(&GREETING), Duration::from_secs(10)).await;
    let addr = spawn_server(&upstream).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/relay/ws?prompt=Take%20your%20time"))
        .await
        .unwrap();
    ws.send(Message::Text("cancel".into())).await.unwrap();
    let messages = read_messages(&mut ws).await;

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["type"], "complete");
    assert_eq!(messages[0]["reason"], "cancelled");
}

#[tokio::test]
async fn test_websocket_rejects_empty_prompt() {
    let upstream = MockServer::start().await;
    let addr = spawn_server(&upstream).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/relay/ws?prompt=%20"))
        .await
        .unwrap();
    let messages = read_messages(&mut ws).await;

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["type"], "error");
    assert_eq!(messages[0]["kind"], "invalid_input");
}

#[tokio::test]
async fn test_websocket_closes_after_complete_update() {
    let upstream = MockServer::start().await;
    mount_reply(&upstream, sse_reply(&["Short", " answer"])).await;
    let addr = spawn_server(&upstream).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/relay/ws?prompt=Be%20brief"))
        .await
        .unwrap();

    let mut last_update = None;
    let mut closed = false;
    while let Some(frame) = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("server should close the socket")
    {
        match frame.unwrap() {
            Message::Text(text) => last_update = Some(serde_json::from_str::<Value>(text.as_str()).unwrap()),
            Message::Close(_) => {
                closed = true;
                break;
            }
            _ => {}
        }
    }

    assert!(closed, "expected a close frame from the server");
    let last_update = last_update.unwrap();
    assert_eq!(last_update["type"], "complete");
    assert_eq!(last_update["reason"], "done");
}
