//! Integration tests for the server: routing, authentication, binary and
//! text channels, the schema handshake and shutdown.
//!
//! Every test binds a real server on `127.0.0.1:0` and talks to it with a
//! `tokio-tungstenite` client.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use lobbywire::prelude::*;
use lobbywire::ConfigError;
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::Message;

type Ws = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

// =========================================================================
// Harness
// =========================================================================

/// Starts `builder` on an OS-assigned port and returns its address.
async fn start<A>(builder: ServerBuilder<A>) -> (String, ShutdownHandle)
where
    A: Authenticator + Send + Sync + 'static,
{
    let server = builder.bind("127.0.0.1:0").build().await.unwrap();
    let addr = server.local_addr().unwrap().to_string();
    let handle = server.shutdown_handle();
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    (addr, handle)
}

async fn ws(addr: &str, path: &str) -> Ws {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}{path}"))
        .await
        .unwrap();
    ws
}

async fn next_message(ws: &mut Ws) -> Message {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
            .expect("read failed");
        if !matches!(msg, Message::Ping(_) | Message::Pong(_)) {
            return msg;
        }
    }
}

async fn next_binary(ws: &mut Ws) -> Vec<u8> {
    match next_message(ws).await {
        Message::Binary(data) => data.to_vec(),
        other => panic!("expected a binary message, got {other:?}"),
    }
}

async fn close_reason(ws: &mut Ws) -> String {
    match next_message(ws).await {
        Message::Close(Some(frame)) => frame.reason.as_str().to_owned(),
        other => panic!("expected a close frame, got {other:?}"),
    }
}

fn tagged(tag: u8, payload: Vec<u8>) -> Message {
    let mut frame = vec![tag];
    frame.extend(payload);
    Message::Binary(frame.into())
}

async fn wait_for_len(channel: &Channel, len: usize) {
    for _ in 0..200 {
        if channel.registry().len() == len {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("registry never reached {len} connections");
}

/// A chat channel: `say` (receiver 0) is rebroadcast to everyone as
/// `chat` (destination 0), prefixed with the sender's user id.
fn chat_channel() -> Arc<Channel> {
    let mut builder = Channel::builder("lobby");
    let chat = builder.destination("chat", string());
    builder.receiver("say", string(), move |session: Session, text: String| {
        let chat = chat.clone();
        async move {
            let line = format!("{}: {text}", session.user().0);
            let _ = chat.to_all(&line);
        }
    });
    builder.build()
}

// =========================================================================
// Routing and authentication
// =========================================================================

#[tokio::test]
async fn test_routed_channel_echoes_to_sender() {
    let lobby = chat_channel();
    let (addr, _stop) = start(Server::builder().route("/lobby", Arc::clone(&lobby))).await;

    let mut client = ws(&addr, "/lobby?user=42").await;
    client
        .send(tagged(0, encode(&string(), &"hi".to_owned()).unwrap()))
        .await
        .unwrap();

    let frame = next_binary(&mut client).await;
    assert_eq!(frame[0], 0, "chat is destination tag 0");
    let line: String = decode(&string(), &frame[1..]).unwrap();
    assert_eq!(line, "42: hi");
}

#[tokio::test]
async fn test_unknown_path_is_closed() {
    let (addr, _stop) = start(Server::builder().route("/lobby", chat_channel())).await;

    let mut client = ws(&addr, "/nowhere?user=1").await;
    assert_eq!(close_reason(&mut client).await, "unknown path");
}

#[tokio::test]
async fn test_failed_authentication_is_closed_before_registration() {
    let lobby = chat_channel();
    let (addr, _stop) = start(Server::builder().route("/lobby", Arc::clone(&lobby))).await;

    let mut client = ws(&addr, "/lobby?user=not-a-number").await;
    assert_eq!(close_reason(&mut client).await, "unauthorized");
    assert!(lobby.registry().is_empty());
}

#[tokio::test]
async fn test_custom_authenticator() {
    let lobby = chat_channel();
    let builder = Server::builder()
        .route("/lobby", Arc::clone(&lobby))
        .authenticator(AnonymousAuthenticator::default());
    let (addr, _stop) = start(builder).await;

    let _a = ws(&addr, "/lobby").await;
    let _b = ws(&addr, "/lobby").await;
    wait_for_len(&lobby, 2).await;

    let mut users: Vec<u64> = lobby.registry().snapshot().iter().map(|s| s.user().0).collect();
    users.sort_unstable();
    assert_eq!(users, vec![1, 2]);
}

// =========================================================================
// Binary channels
// =========================================================================

#[tokio::test]
async fn test_broadcast_reaches_every_connection() {
    let lobby = chat_channel();
    let (addr, _stop) = start(Server::builder().route("/lobby", Arc::clone(&lobby))).await;

    let mut alice = ws(&addr, "/lobby?user=1").await;
    let mut bob = ws(&addr, "/lobby?user=2").await;
    wait_for_len(&lobby, 2).await;

    alice
        .send(tagged(0, encode(&string(), &"hello".to_owned()).unwrap()))
        .await
        .unwrap();

    for client in [&mut alice, &mut bob] {
        let frame = next_binary(client).await;
        let line: String = decode(&string(), &frame[1..]).unwrap();
        assert_eq!(line, "1: hello");
    }
}

#[tokio::test]
async fn test_second_receiver_uses_tag_one() {
    let mut builder = Channel::builder("scores");
    let result = builder.destination("result", int32());
    builder.receiver("ignored", string(), |_s: Session, _v: String| async {});
    builder.receiver("double", int32(), move |session: Session, n: i32| {
        let result = result.clone();
        async move {
            let _ = result.to_connection(&session, &(n * 2));
        }
    });
    let channel = builder.build();
    assert_eq!(channel.receiver_tag("double"), Some(1));

    let (addr, _stop) = start(Server::builder().route("/scores", channel)).await;
    let mut client = ws(&addr, "/scores?user=5").await;

    // Garbage, an unknown tag and a bad payload are dropped...
    client.send(Message::Binary(Vec::<u8>::new().into())).await.unwrap();
    client.send(tagged(9, vec![1, 2, 3])).await.unwrap();
    client.send(tagged(1, vec![1])).await.unwrap();
    // ...and the connection keeps working.
    client
        .send(tagged(1, encode(&int32(), &21).unwrap()))
        .await
        .unwrap();

    let frame = next_binary(&mut client).await;
    assert_eq!(frame, vec![0, 42, 0, 0, 0]);
}

#[tokio::test]
async fn test_disconnect_removes_connection() {
    let lobby = chat_channel();
    let (addr, _stop) = start(Server::builder().route("/lobby", Arc::clone(&lobby))).await;

    let mut client = ws(&addr, "/lobby?user=3").await;
    wait_for_len(&lobby, 1).await;

    client.close(None).await.unwrap();
    wait_for_len(&lobby, 0).await;
}

// =========================================================================
// Schema handshake
// =========================================================================

#[tokio::test]
async fn test_schema_handshake() {
    let lobby = chat_channel();
    let config = ServerConfig {
        schema_handshake: true,
        ..ServerConfig::default()
    };
    let builder = Server::builder()
        .config(config)
        .route("/lobby", Arc::clone(&lobby));
    let (addr, _stop) = start(builder).await;

    // Matching fingerprint: admitted, then ordinary traffic flows.
    let mut good = ws(&addr, "/lobby?user=1").await;
    good.send(Message::Binary(lobby.fingerprint().to_vec().into()))
        .await
        .unwrap();
    good.send(tagged(0, encode(&string(), &"in".to_owned()).unwrap()))
        .await
        .unwrap();
    let frame = next_binary(&mut good).await;
    let line: String = decode(&string(), &frame[1..]).unwrap();
    assert_eq!(line, "1: in");

    // Wrong fingerprint: closed and never registered.
    let mut bad = ws(&addr, "/lobby?user=2").await;
    bad.send(Message::Binary(vec![0u8; 8].into())).await.unwrap();
    assert_eq!(close_reason(&mut bad).await, "schema mismatch");
    assert_eq!(lobby.registry().count_for_user(UserId(2)), 0);
}

// =========================================================================
// Text channels
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Move {
    x: u8,
    y: u8,
}

#[tokio::test]
async fn test_text_channel_routes_alongside_binary() {
    let mut builder = TextChannel::builder("legacy");
    let moved = builder.destination::<Move>("moved");
    builder.receiver("move", move |session: Session, m: Move| {
        let moved = moved.clone();
        async move {
            let _ = moved.to_connection(&session, &m);
        }
    });
    let legacy = builder.build();

    let server = Server::builder()
        .route("/lobby", chat_channel())
        .route("/legacy", legacy);
    let (addr, _stop) = start(server).await;

    let mut client = ws(&addr, "/legacy?user=8").await;
    client
        .send(Message::Text("move\n{\"x\":1,\"y\":2}".into()))
        .await
        .unwrap();

    match next_message(&mut client).await {
        Message::Text(text) => {
            let (name, body) = text.as_str().split_once('\n').unwrap();
            assert_eq!(name, "moved");
            let m: Move = serde_json::from_str(body).unwrap();
            assert_eq!(m, Move { x: 1, y: 2 });
        }
        other => panic!("expected a text message, got {other:?}"),
    }
}

// =========================================================================
// Shutdown
// =========================================================================

#[tokio::test]
async fn test_shutdown_stops_run() {
    let server = Server::builder()
        .bind("127.0.0.1:0")
        .route("/lobby", chat_channel())
        .build()
        .await
        .unwrap();
    let handle = server.shutdown_handle();
    let run = tokio::spawn(server.run());

    handle.shutdown();
    let result = tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .expect("run should return after shutdown")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_build_rejects_invalid_config() {
    let config = ServerConfig {
        bind_addr: "127.0.0.1:0".into(),
        ping_interval_secs: 0,
        ..ServerConfig::default()
    };
    let result = Server::builder()
        .config(config)
        .route("/lobby", chat_channel())
        .build()
        .await;
    assert!(matches!(
        result,
        Err(LobbywireError::Config(ConfigError::Invalid(_)))
    ));
}

#[test]
#[should_panic(expected = "already routed")]
fn test_duplicate_route_panics() {
    let _ = Server::builder()
        .route("/lobby", chat_channel())
        .route("/lobby", chat_channel());
}
