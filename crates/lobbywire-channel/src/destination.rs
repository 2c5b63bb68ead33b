//! Typed outbound message kinds.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use lobbywire_bcs::{encode_into, Codec};
use lobbywire_transport::{ConnectionId, Frame};

use crate::{ChannelError, ConnectionRegistry, SendFailure, Session, UserId};

/// Outcome of sending one frame to a group of connections.
///
/// Each connection is attempted independently: one full or closed queue
/// shows up in `failures` and never stops delivery to the rest.
#[derive(Debug, Default)]
pub struct BroadcastReport {
    /// How many connections accepted the frame.
    pub delivered: usize,
    /// One entry per connection that didn't.
    pub failures: Vec<SendFailure>,
}

impl BroadcastReport {
    /// Returns `true` if every targeted connection accepted the frame.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Total connections targeted.
    pub fn attempted(&self) -> usize {
        self.delivered + self.failures.len()
    }
}

/// An outbound message kind with a fixed tag and codec.
///
/// Obtained from [`ChannelBuilder::destination`](crate::ChannelBuilder::destination).
/// Every frame it sends is `[tag][BCS payload]`; the peer must have
/// registered its receivers in the same order for the tag to mean the
/// same message there.
pub struct Destination<T> {
    inner: Arc<DestinationInner<T>>,
}

struct DestinationInner<T> {
    name: String,
    tag: u8,
    codec: Box<dyn Codec<T>>,
    registry: Arc<ConnectionRegistry>,
}

impl<T> Clone for Destination<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Destination<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Destination")
            .field("name", &self.inner.name)
            .field("tag", &self.inner.tag)
            .finish()
    }
}

impl<T> Destination<T> {
    pub(crate) fn new(
        name: String,
        tag: u8,
        codec: Box<dyn Codec<T>>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            inner: Arc::new(DestinationInner {
                name,
                tag,
                codec,
                registry,
            }),
        }
    }

    /// The name this destination was registered under.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The tag byte prefixed to every frame.
    pub fn tag(&self) -> u8 {
        self.inner.tag
    }

    /// Encodes `value` as a complete frame: tag byte, then payload.
    pub fn frame(&self, value: &T) -> Result<Bytes, ChannelError> {
        let codec = &*self.inner.codec;
        let mut buf = Vec::with_capacity(1 + codec.size(value));
        buf.push(self.inner.tag);
        encode_into(codec, &mut buf, value).map_err(|source| {
            if source.is_defect() {
                tracing::error!(
                    destination = %self.inner.name,
                    error = %source,
                    "codec wrote a different size than it reported"
                );
            }
            ChannelError::Encode {
                destination: self.inner.name.clone(),
                source,
            }
        })?;
        Ok(Bytes::from(buf))
    }

    /// Sends `value` to one connection.
    pub fn to_connection(
        &self,
        session: &Session,
        value: &T,
    ) -> Result<(), ChannelError> {
        let frame = self.frame(value)?;
        session.send(Frame::Binary(frame))?;
        Ok(())
    }

    /// Sends `value` to every live connection.
    pub fn to_all(&self, value: &T) -> Result<BroadcastReport, ChannelError> {
        self.broadcast(value, |_| true)
    }

    /// Sends `value` to every connection opened by `user`.
    pub fn to_user(
        &self,
        user: UserId,
        value: &T,
    ) -> Result<BroadcastReport, ChannelError> {
        self.broadcast(value, |s| s.user() == user)
    }

    /// Sends `value` to every live connection except `except`.
    pub fn to_all_except(
        &self,
        except: ConnectionId,
        value: &T,
    ) -> Result<BroadcastReport, ChannelError> {
        self.broadcast(value, |s| s.id() != except)
    }

    fn broadcast(
        &self,
        value: &T,
        filter: impl FnMut(&Session) -> bool,
    ) -> Result<BroadcastReport, ChannelError> {
        let frame = Frame::Binary(self.frame(value)?);
        Ok(broadcast(&self.inner.registry, &self.inner.name, &frame, filter))
    }
}

/// Enqueues `frame` to each matching connection in a registry snapshot.
pub(crate) fn broadcast(
    registry: &ConnectionRegistry,
    name: &str,
    frame: &Frame,
    mut filter: impl FnMut(&Session) -> bool,
) -> BroadcastReport {
    let mut report = BroadcastReport::default();

    for session in registry.snapshot().iter() {
        if !filter(session) {
            continue;
        }
        match session.send(frame.clone()) {
            Ok(()) => report.delivered += 1,
            Err(failure) => {
                tracing::debug!(
                    destination = name,
                    conn_id = %failure.connection,
                    error = %failure.source,
                    "broadcast skipped a connection"
                );
                report.failures.push(failure);
            }
        }
    }
    report
}
