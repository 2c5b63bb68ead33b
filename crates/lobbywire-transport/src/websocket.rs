//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! `accept` only takes sockets off the listener; the upgrade handshake for
//! each one runs on its own task.
//!
//! Each upgraded socket is split in two. The read half stays with the
//! [`WebSocketConnection`] and is driven by whoever calls `recv`. The write
//! half moves into a spawned writer task that drains the connection's
//! [`OutboundQueue`] and keeps the peer alive with pings.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use std::fmt;

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::{
    outbound_queue, Connection, ConnectionId, Frame, FrameSender,
    OutboundQueue, Outgoing, Transport, TransportConfig, TransportError,
    UpgradeRequest,
};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = WebSocketStream<TcpStream>;

/// Upgraded connections waiting for [`Transport::accept`].
const READY_BACKLOG: usize = 64;

/// A WebSocket-based [`Transport`] that listens for incoming connections.
///
/// The WebSocket upgrade of each new socket runs on its own task, bounded
/// by [`TransportConfig::upgrade_timeout`], so a peer that never finishes
/// its handshake cannot hold up anyone else's `accept`.
pub struct WebSocketTransport {
    listener: TcpListener,
    config: TransportConfig,
    shutdown: watch::Sender<bool>,
    ready_tx: mpsc::Sender<WebSocketConnection>,
    ready_rx: mpsc::Receiver<WebSocketConnection>,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    ///
    /// Fails with [`TransportError::InvalidConfig`] before binding if
    /// `config` does not validate.
    pub async fn bind(
        addr: &str,
        config: TransportConfig,
    ) -> Result<Self, TransportError> {
        config.validate()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        let local = listener.local_addr().map_err(TransportError::AcceptFailed)?;
        tracing::info!(%local, "WebSocket transport listening");
        let (shutdown, _) = watch::channel(false);
        let (ready_tx, ready_rx) = mpsc::channel(READY_BACKLOG);
        Ok(Self {
            listener,
            config,
            shutdown,
            ready_tx,
            ready_rx,
        })
    }

    /// The settings applied to accepted connections.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow_and_update() {
            return Err(TransportError::Shutdown);
        }

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => return Err(TransportError::Shutdown),
                Some(conn) = self.ready_rx.recv() => return Ok(conn),
                accepted = self.listener.accept() => {
                    let (stream, addr) =
                        accepted.map_err(TransportError::AcceptFailed)?;
                    tokio::spawn(upgrade(
                        stream,
                        addr,
                        self.config.clone(),
                        self.ready_tx.clone(),
                    ));
                }
            }
        }
    }

    fn local_addr(&self) -> Result<SocketAddr, Self::Error> {
        self.listener.local_addr().map_err(TransportError::AcceptFailed)
    }

    async fn shutdown(&self) -> Result<(), Self::Error> {
        self.shutdown.send_replace(true);
        tracing::info!("WebSocket transport shut down");
        Ok(())
    }
}

/// Runs the WebSocket handshake for one socket and hands the connection
/// to the next `accept`.
async fn upgrade(
    stream: TcpStream,
    addr: SocketAddr,
    config: TransportConfig,
    ready: mpsc::Sender<WebSocketConnection>,
) {
    let mut captured = None;
    let handshake = tokio_tungstenite::accept_hdr_async(
        stream,
        |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            captured = Some(upgrade_request(req));
            Ok(resp)
        },
    );
    let ws = match tokio::time::timeout(config.upgrade_timeout, handshake).await {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => {
            tracing::debug!(%addr, error = %e, "WebSocket upgrade failed");
            return;
        }
        Err(_) => {
            tracing::debug!(%addr, "WebSocket upgrade timed out");
            return;
        }
    };
    let request = captured.unwrap_or_default();

    let id = ConnectionId::new(
        NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
    );
    tracing::debug!(%id, %addr, path = %request.path, "accepted WebSocket connection");

    let conn = WebSocketConnection::start(id, request, ws, &config);
    if ready.send(conn).await.is_err() {
        tracing::debug!(%id, "transport gone before connection was accepted");
    }
}

fn upgrade_request(req: &Request) -> UpgradeRequest {
    let uri = req.uri();
    UpgradeRequest {
        path: uri.path().to_owned(),
        query: uri.query().map(str::to_owned),
        headers: req
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                let value = value.to_str().ok()?;
                Some((name.as_str().to_owned(), value.to_owned()))
            })
            .collect(),
    }
}

/// Milliseconds since `epoch` at which the peer was last heard from.
#[derive(Debug)]
struct Liveness {
    epoch: Instant,
    last_seen_ms: AtomicU64,
}

impl Liveness {
    fn new() -> Self {
        Self {
            epoch: Instant::now(),
            last_seen_ms: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let now = self.epoch.elapsed().as_millis() as u64;
        self.last_seen_ms.store(now, Ordering::Relaxed);
    }

    fn idle_ms(&self) -> u64 {
        let now = self.epoch.elapsed().as_millis() as u64;
        now.saturating_sub(self.last_seen_ms.load(Ordering::Relaxed))
    }
}

/// A single WebSocket connection.
///
/// Dropping it closes the connection.
pub struct WebSocketConnection {
    id: ConnectionId,
    request: UpgradeRequest,
    stream: SplitStream<WsStream>,
    sender: FrameSender,
    liveness: Arc<Liveness>,
    max_frame_size: usize,
}

impl WebSocketConnection {
    fn start(
        id: ConnectionId,
        request: UpgradeRequest,
        ws: WsStream,
        config: &TransportConfig,
    ) -> Self {
        let (sink, stream) = ws.split();
        let (sender, queue) = outbound_queue(id, config.outbound_queue);
        let liveness = Arc::new(Liveness::new());

        tokio::spawn(write_loop(
            sink,
            queue,
            sender.clone(),
            Arc::clone(&liveness),
            config.clone(),
        ));

        Self {
            id,
            request,
            stream,
            sender,
            liveness,
            max_frame_size: config.max_frame_size,
        }
    }

    fn check_size(&self, size: usize) -> Result<(), TransportError> {
        if size > self.max_frame_size {
            self.sender.close("frame too large");
            return Err(TransportError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }
        Ok(())
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn request(&self) -> &UpgradeRequest {
        &self.request
    }

    fn sender(&self) -> FrameSender {
        self.sender.clone()
    }

    async fn recv(&mut self) -> Result<Option<Frame>, Self::Error> {
        loop {
            let msg = tokio::select! {
                biased;
                () = self.sender.closed() => return Ok(None),
                msg = self.stream.next() => msg,
            };
            let msg = match msg {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    self.sender.close("receive failed");
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
                None => {
                    self.sender.close("peer went away");
                    return Ok(None);
                }
            };
            self.liveness.touch();
            match msg {
                Message::Binary(data) => {
                    self.check_size(data.len())?;
                    return Ok(Some(Frame::Binary(data)));
                }
                Message::Text(text) => {
                    self.check_size(text.len())?;
                    return Ok(Some(Frame::Text(text.as_str().to_owned())));
                }
                Message::Close(_) => {
                    self.sender.close("closed by peer");
                    return Ok(None);
                }
                // Pings are answered by tungstenite; pongs only count
                // as liveness.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {
                    continue;
                }
            }
        }
    }
}

impl fmt::Debug for WebSocketConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketConnection")
            .field("id", &self.id)
            .field("path", &self.request.path)
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

impl Drop for WebSocketConnection {
    fn drop(&mut self) {
        self.sender.close("connection dropped");
    }
}

/// Why the writer gave up on a send.
enum WriteError {
    Failed(tokio_tungstenite::tungstenite::Error),
    /// The peer stopped reading for longer than `ping_timeout`.
    Stalled,
}

/// Sends `msg`, giving up once the socket has not drained for `limit`.
async fn send_within(
    sink: &mut SplitSink<WsStream, Message>,
    msg: Message,
    limit: Duration,
) -> Result<(), WriteError> {
    match tokio::time::timeout(limit, sink.send(msg)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(WriteError::Failed(e)),
        Err(_) => Err(WriteError::Stalled),
    }
}

async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut queue: OutboundQueue,
    sender: FrameSender,
    liveness: Arc<Liveness>,
    config: TransportConfig,
) {
    let id = sender.id();
    let limit = config.ping_timeout;
    let timeout_ms = limit.as_millis() as u64;
    let mut ping = tokio::time::interval_at(
        Instant::now() + config.ping_interval,
        config.ping_interval,
    );

    loop {
        let sent = tokio::select! {
            next = queue.next() => match next {
                Some(Outgoing::Frame(frame)) => {
                    let msg = match frame {
                        Frame::Binary(data) => Message::Binary(data),
                        Frame::Text(text) => Message::Text(text.into()),
                    };
                    send_within(&mut sink, msg, limit).await
                }
                Some(Outgoing::Close(reason)) => {
                    tracing::debug!(%id, %reason, "closing connection");
                    let code = if reason == "ping timeout" {
                        CloseCode::Policy
                    } else {
                        CloseCode::Normal
                    };
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    let _ = send_within(&mut sink, Message::Close(Some(frame)), limit).await;
                    break;
                }
                None => {
                    let _ = tokio::time::timeout(limit, sink.close()).await;
                    break;
                }
            },
            _ = ping.tick() => {
                if liveness.idle_ms() > timeout_ms {
                    tracing::info!(%id, "peer missed keepalive");
                    sender.close("ping timeout");
                    continue;
                }
                send_within(&mut sink, Message::Ping(Bytes::new()), limit).await
            }
        };

        match sent {
            Ok(()) => {}
            Err(WriteError::Failed(e)) => {
                tracing::debug!(%id, error = %e, "write failed");
                break;
            }
            Err(WriteError::Stalled) => {
                tracing::info!(%id, "peer stopped reading");
                sender.close("ping timeout");
                break;
            }
        }
    }

    // Unblocks a reader still waiting on the socket.
    sender.close("writer stopped");
}
