//! Transport abstraction layer for lobbywire.
//!
//! Provides the [`Transport`] and [`Connection`] traits that abstract over
//! the socket, plus the pieces every connection shares:
//!
//! - [`Frame`] — one binary or text WebSocket message.
//! - [`FrameSender`] — a cloneable, non-blocking handle onto a connection's
//!   bounded outbound queue.
//! - [`UpgradeRequest`] — what the client asked for when it opened the
//!   socket (path, query, headers).
//!
//! # Feature Flags
//!
//! - `websocket` (default) — WebSocket transport via `tokio-tungstenite`

mod config;
mod error;
mod queue;
mod request;
#[cfg(feature = "websocket")]
mod websocket;

pub use config::TransportConfig;
pub use error::TransportError;
pub use queue::{outbound_queue, FrameSender, OutboundQueue, Outgoing};
pub use request::UpgradeRequest;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;

use bytes::Bytes;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// One message on the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A binary message (tagged BCS frames).
    Binary(Bytes),
    /// A UTF-8 text message (the legacy `name\njson` frames).
    Text(String),
}

impl Frame {
    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Binary(b) => b.len(),
            Self::Text(t) => t.len(),
        }
    }

    /// Returns `true` for a zero-length payload.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    fn accept(
        &mut self,
    ) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send;

    /// Returns the address the transport is listening on.
    fn local_addr(&self) -> Result<SocketAddr, Self::Error>;

    /// Gracefully shuts down the transport, stopping new connections.
    fn shutdown(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// A single live connection.
///
/// Receiving is exclusive (`&mut self`): exactly one task reads a
/// connection, which is what gives per-connection in-order delivery.
/// Sending goes through [`FrameSender`] handles, which any task may hold.
pub trait Connection: Send + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// The upgrade request that opened this connection.
    fn request(&self) -> &UpgradeRequest;

    /// A handle onto this connection's outbound queue.
    fn sender(&self) -> FrameSender;

    /// Receives the next frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is closed, by either side.
    fn recv(
        &mut self,
    ) -> impl Future<Output = Result<Option<Frame>, Self::Error>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_hash_works_as_map_key() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(ConnectionId::new(1), "alice");
        map.insert(ConnectionId::new(2), "bob");
        assert_eq!(map[&ConnectionId::new(1)], "alice");
    }

    #[test]
    fn test_frame_len() {
        assert_eq!(Frame::Binary(Bytes::from_static(&[1, 2])).len(), 2);
        assert_eq!(Frame::Text("héllo".into()).len(), 6);
        assert!(Frame::Text(String::new()).is_empty());
    }
}
