//! Session types: the server's record of one live connection.
//!
//! A session pairs a socket with the user that opened it and tracks where
//! it is in its lifecycle:
//!
//! ```text
//!   Open ──(close requested / peer gone)──→ Closing ──(removed)──→ Closed
//! ```
//!
//! - **Open**: frames are dispatched and sends are accepted.
//! - **Closing**: a close was initiated by either side. Inbound frames
//!   are discarded; frames already queued still drain to the socket.
//! - **Closed**: removed from the [`ConnectionRegistry`](crate::ConnectionRegistry).
//!   Terminal.
//!
//! States only move forward.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use lobbywire_transport::{ConnectionId, Frame, FrameSender, UpgradeRequest};

use crate::{SendFailure, UserId};

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// The lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    Open,
    Closing,
    Closed,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Open,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }

    /// Returns `true` if frames may still be dispatched and sent.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "Open"),
            Self::Closing => write!(f, "Closing"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A single live connection and the user behind it.
///
/// Cheap to clone; all clones share the same state. Handlers and hooks
/// receive a `Session` and use it to reply or to close the connection.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: ConnectionId,
    user: UserId,
    request: UpgradeRequest,
    sender: FrameSender,
    state: AtomicU8,
}

impl Session {
    /// Creates an `Open` session over `sender`.
    pub fn new(
        user: UserId,
        request: UpgradeRequest,
        sender: FrameSender,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id: sender.id(),
                user,
                request,
                sender,
                state: AtomicU8::new(ConnectionState::Open as u8),
            }),
        }
    }

    /// The connection's id.
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// The user that opened the connection.
    pub fn user(&self) -> UserId {
        self.inner.user
    }

    /// The upgrade request the connection was opened with.
    pub fn request(&self) -> &UpgradeRequest {
        &self.inner.request
    }

    /// Current lifecycle state.
    ///
    /// A connection whose socket has gone away reports `Closing` even
    /// before its receive loop notices.
    pub fn state(&self) -> ConnectionState {
        let state =
            ConnectionState::from_u8(self.inner.state.load(Ordering::Acquire));
        if state.is_open() && self.inner.sender.is_closed() {
            return ConnectionState::Closing;
        }
        state
    }

    /// Shorthand for `state().is_open()`.
    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    /// Starts closing the connection. Frames already queued are still
    /// written, then the socket is closed with `reason`.
    pub fn close(&self, reason: &str) {
        self.advance(ConnectionState::Closing);
        if self.inner.sender.close(reason) {
            tracing::debug!(conn_id = %self.id(), user = %self.user(), reason, "closing connection");
        }
    }

    /// The reason the connection is closing, once known.
    pub fn close_reason(&self) -> Option<String> {
        self.inner.sender.close_reason()
    }

    /// Enqueues a raw frame for this connection without waiting.
    pub fn send(&self, frame: Frame) -> Result<(), SendFailure> {
        self.inner.sender.try_send(frame).map_err(|source| SendFailure {
            connection: self.id(),
            source,
        })
    }

    pub(crate) fn mark_closed(&self) {
        self.advance(ConnectionState::Closed);
    }

    fn advance(&self, to: ConnectionState) {
        self.inner.state.fetch_max(to as u8, Ordering::AcqRel);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("user", &self.user())
            .field("state", &self.state())
            .finish()
    }
}
