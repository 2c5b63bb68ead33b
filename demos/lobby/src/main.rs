//! A small lobby chat on lobbywire.
//!
//! Binary clients connect to `/lobby?user=<id>`; older JSON clients use
//! `/legacy?user=<id>` and see the same chat.
//!
//! ```text
//! cargo run -p lobby -- lobby.toml
//! ```

use std::sync::Arc;

use lobbywire::prelude::*;
use lobbywire::ConnectionRegistry;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ChatLine {
    from: u64,
    text: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PresenceKind {
    Joined,
    Left,
}

#[derive(Debug, Clone, PartialEq)]
struct Presence {
    user: u64,
    kind: PresenceKind,
}

fn chat_line() -> impl Codec<ChatLine> {
    structure(
        "ChatLine",
        (
            field("from", |l: &ChatLine| &l.from, uint64()),
            field("text", |l: &ChatLine| &l.text, string()),
        ),
        |(from, text)| ChatLine { from, text },
    )
}

fn presence() -> impl Codec<Presence> {
    structure(
        "Presence",
        (
            field("user", |p: &Presence| &p.user, uint64()),
            field(
                "kind",
                |p: &Presence| &p.kind,
                enumeration("PresenceKind", vec![PresenceKind::Joined, PresenceKind::Left]),
            ),
        ),
        |(user, kind)| Presence { user, kind },
    )
}

/// Distinct users currently connected, ascending.
fn roster(registry: &ConnectionRegistry) -> Vec<u64> {
    let mut users: Vec<u64> = registry.snapshot().iter().map(|s| s.user().0).collect();
    users.sort_unstable();
    users.dedup();
    users
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

fn lobby_channel() -> Arc<Channel> {
    let mut lobby = Channel::builder("lobby");
    let registry = lobby.registry();

    let chat = lobby.destination("chat", chat_line());
    let presence = lobby.destination("presence", presence());
    let users = lobby.destination("roster", list(uint64()));

    let say = chat.clone();
    lobby.receiver("say", string(), move |session: Session, text: String| {
        let say = say.clone();
        async move {
            let line = ChatLine { from: session.user().0, text };
            if let Err(e) = say.to_all(&line) {
                tracing::error!(error = %e, "failed to broadcast chat line");
            }
        }
    });

    lobby.receiver(
        "whisper",
        tuple((uint64(), string())),
        move |session: Session, (to, text): (u64, String)| {
            let chat = chat.clone();
            async move {
                let line = ChatLine { from: session.user().0, text };
                match chat.to_user(UserId(to), &line) {
                    Ok(report) if report.attempted() == 0 => {
                        tracing::debug!(to, "whisper to a user who is not here");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "failed to send whisper"),
                }
            }
        },
    );

    let joined = presence.clone();
    lobby.on_connect(move |session: Session| {
        let joined = joined.clone();
        let users = users.clone();
        let registry = Arc::clone(&registry);
        async move {
            let _ = users.to_connection(&session, &roster(&registry));
            let event = Presence {
                user: session.user().0,
                kind: PresenceKind::Joined,
            };
            let _ = joined.to_all_except(session.id(), &event);
        }
    });

    lobby.on_disconnect(move |session: Session| {
        let left = presence.clone();
        async move {
            let event = Presence {
                user: session.user().0,
                kind: PresenceKind::Left,
            };
            let _ = left.to_all(&event);
        }
    });

    lobby.build()
}

fn legacy_channel() -> Arc<TextChannel> {
    let mut legacy = TextChannel::builder("legacy");
    let chat = legacy.destination::<ChatLine>("chat");
    legacy.receiver("say", move |session: Session, text: String| {
        let chat = chat.clone();
        async move {
            let line = ChatLine { from: session.user().0, text };
            if let Err(e) = chat.to_all(&line) {
                tracing::error!(error = %e, "failed to broadcast chat line");
            }
        }
    });
    legacy.build()
}

// ---------------------------------------------------------------------------
// Server bootstrap
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), LobbywireError> {
    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    lobbywire::logging::init(&config.log);

    let server = Server::builder()
        .config(config)
        .route("/lobby", lobby_channel())
        .route("/legacy", legacy_channel())
        .build()
        .await?;
    tracing::info!(addr = %server.local_addr()?, "lobby listening");

    let stop = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.shutdown();
        }
    });

    server.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Message;

    type Ws = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn start() -> String {
        let server = Server::builder()
            .bind("127.0.0.1:0")
            .route("/lobby", lobby_channel())
            .route("/legacy", legacy_channel())
            .build()
            .await
            .unwrap();
        let addr = server.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let _ = server.run().await;
        });
        addr
    }

    async fn ws(addr: &str, path: &str) -> Ws {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}{path}"))
            .await
            .unwrap();
        ws
    }

    async fn next_data(ws: &mut Ws) -> Message {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if !matches!(msg, Message::Ping(_) | Message::Pong(_)) {
                return msg;
            }
        }
    }

    #[test]
    fn test_chat_line_encoding() {
        let line = ChatLine { from: 1, text: "hi".into() };
        let bytes = encode(&chat_line(), &line).unwrap();
        assert_eq!(bytes, [1, 0, 0, 0, 0, 0, 0, 0, 2, b'h', b'i']);
        assert_eq!(decode(&chat_line(), &bytes).unwrap(), line);
    }

    #[test]
    fn test_presence_kind_is_an_index() {
        let left = Presence { user: 2, kind: PresenceKind::Left };
        let bytes = encode(&presence(), &left).unwrap();
        assert_eq!(bytes[8..].to_vec(), vec![1]);
    }

    #[tokio::test]
    async fn test_join_sees_roster_and_others_see_presence() {
        let addr = start().await;

        let mut alice = ws(&addr, "/lobby?user=1").await;
        let roster_frame = next_data(&mut alice).await.into_data();
        assert_eq!(roster_frame[0], 2, "roster is destination 2");
        let users: Vec<u64> = decode(&list(uint64()), &roster_frame[1..]).unwrap();
        assert_eq!(users, vec![1]);

        let mut bob = ws(&addr, "/lobby?user=2").await;
        let roster_frame = next_data(&mut bob).await.into_data();
        let users: Vec<u64> = decode(&list(uint64()), &roster_frame[1..]).unwrap();
        assert_eq!(users, vec![1, 2]);

        let joined = next_data(&mut alice).await.into_data();
        assert_eq!(joined[0], 1, "presence is destination 1");
        let event = decode(&presence(), &joined[1..]).unwrap();
        assert_eq!(event, Presence { user: 2, kind: PresenceKind::Joined });
    }

    #[tokio::test]
    async fn test_whisper_reaches_only_its_target() {
        let addr = start().await;
        let mut alice = ws(&addr, "/lobby?user=1").await;
        let _ = next_data(&mut alice).await; // roster
        let mut bob = ws(&addr, "/lobby?user=2").await;
        let _ = next_data(&mut bob).await; // roster
        let _ = next_data(&mut alice).await; // bob joined

        let mut frame = vec![1u8];
        frame.extend(encode(&tuple((uint64(), string())), &(2, "psst".to_owned())).unwrap());
        alice.send(Message::Binary(frame.into())).await.unwrap();

        let got = next_data(&mut bob).await.into_data();
        assert_eq!(got[0], 0);
        let line = decode(&chat_line(), &got[1..]).unwrap();
        assert_eq!(line, ChatLine { from: 1, text: "psst".into() });
    }

    #[tokio::test]
    async fn test_legacy_client_chats_in_json() {
        let addr = start().await;
        let mut client = ws(&addr, "/legacy?user=9").await;
        client
            .send(Message::Text("say\n\"hello\"".into()))
            .await
            .unwrap();

        let reply = next_data(&mut client).await.into_text().unwrap();
        let (name, body) = reply.as_str().split_once('\n').unwrap();
        assert_eq!(name, "chat");
        let line: ChatLine = serde_json::from_str(body).unwrap();
        assert_eq!(line, ChatLine { from: 9, text: "hello".into() });
    }
}
