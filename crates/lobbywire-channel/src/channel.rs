//! Binary channels: tag-multiplexed typed messages over one connection.
//!
//! # Tags are positional
//!
//! Each destination and each receiver gets the next free tag for its
//! direction, counting from 0, in the order it is registered. Nothing on
//! the wire names a message kind. The peer must register its side in the
//! same order, or tag N will be decoded with the wrong codec. With luck
//! that fails decoding. Without luck it produces a wrong value that still
//! parses.
//!
//! [`Channel::fingerprint`] hashes the registration list so the two ends
//! can compare before trusting each other; turning on
//! [`ChannelConfig::schema_handshake`] makes the server insist on it.

use std::fmt::Write as _;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use lobbywire_bcs::{decode, BcsError, Codec};
use lobbywire_transport::{Connection, Frame};
use sha2::{Digest, Sha256};

use crate::lifecycle::{BoxFuture, FrameDispatch, Handshake, Hooks, Lifecycle};
use crate::{ChannelError, ConnectionRegistry, Destination, Session, UserId};

/// Per-server options applied when a channel serves a connection.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Require the first inbound frame to be the 8-byte schema
    /// fingerprint. Off by default, since clients must opt in.
    pub schema_handshake: bool,

    /// How long to wait for the fingerprint frame.
    pub handshake_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            schema_handshake: false,
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

type Dispatch =
    Box<dyn Fn(Session, &[u8]) -> Result<BoxFuture, BcsError> + Send + Sync>;

struct ReceiverEntry {
    name: String,
    schema: String,
    dispatch: Dispatch,
}

struct DestinationEntry {
    name: String,
    schema: String,
}

fn next_tag(registered: usize, direction: &str) -> u8 {
    match u8::try_from(registered) {
        Ok(tag) => tag,
        Err(_) => panic!("a channel supports at most 256 {direction}s"),
    }
}

// ---------------------------------------------------------------------------
// ChannelBuilder
// ---------------------------------------------------------------------------

/// Registers a channel's message kinds, then freezes them.
///
/// Registration happens once at startup. [`build`](Self::build) consumes
/// the builder, so the tag tables cannot change once connections exist.
///
/// # Example
///
/// ```rust
/// use lobbywire_bcs::{int32, string};
/// use lobbywire_channel::ChannelBuilder;
///
/// let mut builder = ChannelBuilder::new("lobby");
/// let chat = builder.destination("chat", string());       // tag 0
/// let score = builder.destination("score", int32());      // tag 1
/// builder.receiver("say", string(), move |session, text: String| {
///     let chat = chat.clone();
///     async move {
///         let _ = chat.to_all_except(session.id(), &text);
///     }
/// });
/// let channel = builder.build();
///
/// assert_eq!(score.tag(), 1);
/// assert_eq!(channel.receiver_tag("say"), Some(0));
/// ```
pub struct ChannelBuilder {
    name: String,
    registry: Arc<ConnectionRegistry>,
    destinations: Vec<DestinationEntry>,
    receivers: Vec<ReceiverEntry>,
    hooks: Hooks,
}

impl ChannelBuilder {
    /// Starts an empty channel called `name` (used in logs).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registry: Arc::new(ConnectionRegistry::new()),
            destinations: Vec::new(),
            receivers: Vec::new(),
            hooks: Hooks::default(),
        }
    }

    /// The registry the built channel will use. Handlers can capture it
    /// to look up connections.
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Registers an outbound message kind and returns its sending handle.
    ///
    /// # Panics
    /// If this channel already has 256 destinations.
    pub fn destination<T, C>(
        &mut self,
        name: impl Into<String>,
        codec: C,
    ) -> Destination<T>
    where
        T: 'static,
        C: Codec<T> + 'static,
    {
        let name = name.into();
        let tag = next_tag(self.destinations.len(), "destination");
        self.destinations.push(DestinationEntry {
            name: name.clone(),
            schema: codec.describe(),
        });
        Destination::new(name, tag, Box::new(codec), Arc::clone(&self.registry))
    }

    /// Registers an inbound message kind and returns its tag.
    ///
    /// `handler` runs on the connection's own task; the next frame from
    /// that connection isn't read until its future completes.
    ///
    /// # Panics
    /// If this channel already has 256 receivers.
    pub fn receiver<T, C, F, Fut>(
        &mut self,
        name: impl Into<String>,
        codec: C,
        handler: F,
    ) -> u8
    where
        T: Send + 'static,
        C: Codec<T> + 'static,
        F: Fn(Session, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let tag = next_tag(self.receivers.len(), "receiver");
        let schema = codec.describe();
        let dispatch: Dispatch = Box::new(
            move |session: Session, payload: &[u8]| -> Result<BoxFuture, BcsError> {
                let value = decode(&codec, payload)?;
                Ok(Box::pin(handler(session, value)))
            },
        );
        self.receivers.push(ReceiverEntry {
            name: name.into(),
            schema,
            dispatch,
        });
        tag
    }

    /// Runs `hook` once per connection, after it is added to the registry
    /// and before its first frame is dispatched.
    pub fn on_connect<F, Fut>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(Session) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hooks.on_connect(hook);
        self
    }

    /// Runs `hook` once per connection, after it leaves the registry.
    pub fn on_disconnect<F, Fut>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(Session) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hooks.on_disconnect(hook);
        self
    }

    /// Freezes the registrations.
    pub fn build(self) -> Arc<Channel> {
        let schema = schema_text(&self.destinations, &self.receivers);
        let digest = Sha256::digest(schema.as_bytes());
        let mut fingerprint = [0u8; 8];
        fingerprint.copy_from_slice(&digest[..8]);

        tracing::info!(
            channel = %self.name,
            destinations = self.destinations.len(),
            receivers = self.receivers.len(),
            fingerprint = %hex::encode(fingerprint),
            "channel built"
        );

        Arc::new(Channel {
            name: self.name,
            registry: self.registry,
            destinations: self.destinations,
            receivers: self.receivers,
            hooks: self.hooks,
            schema,
            fingerprint,
        })
    }
}

/// The text hashed into the fingerprint, one line per registration.
///
/// Lists are written from the server's side (`out` = server to client),
/// so a client hashing its mirror registrations under the same labels
/// arrives at the same value.
fn schema_text(
    destinations: &[DestinationEntry],
    receivers: &[ReceiverEntry],
) -> String {
    let mut text = String::new();
    for (tag, d) in destinations.iter().enumerate() {
        let _ = writeln!(text, "out {tag} {} {}", d.name, d.schema);
    }
    for (tag, r) in receivers.iter().enumerate() {
        let _ = writeln!(text, "in {tag} {} {}", r.name, r.schema);
    }
    text
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// A built binary channel: frozen tag tables, hooks, and the live
/// connection list.
pub struct Channel {
    name: String,
    registry: Arc<ConnectionRegistry>,
    destinations: Vec<DestinationEntry>,
    receivers: Vec<ReceiverEntry>,
    hooks: Hooks,
    schema: String,
    fingerprint: [u8; 8],
}

impl Channel {
    /// Shorthand for [`ChannelBuilder::new`].
    pub fn builder(name: impl Into<String>) -> ChannelBuilder {
        ChannelBuilder::new(name)
    }

    /// The channel's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The live connections on this channel.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// First 8 bytes of the SHA-256 of the registration list.
    pub fn fingerprint(&self) -> [u8; 8] {
        self.fingerprint
    }

    /// The registration list the fingerprint is computed from.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// The tag of the receiver registered as `name`.
    pub fn receiver_tag(&self, name: &str) -> Option<u8> {
        let index = self.receivers.iter().position(|r| r.name == name)?;
        u8::try_from(index).ok()
    }

    /// The tag of the destination registered as `name`.
    pub fn destination_tag(&self, name: &str) -> Option<u8> {
        let index = self.destinations.iter().position(|d| d.name == name)?;
        u8::try_from(index).ok()
    }

    /// Decodes one binary frame and runs its receiver's handler to
    /// completion.
    ///
    /// # Errors
    /// `EmptyFrame` without a tag byte, `UnknownTag` if no receiver has
    /// the tag, `Decode` if the payload doesn't match the receiver's codec.
    /// None of these affect the connection.
    pub async fn dispatch(
        &self,
        session: &Session,
        frame: &[u8],
    ) -> Result<(), ChannelError> {
        let (&tag, payload) =
            frame.split_first().ok_or(ChannelError::EmptyFrame)?;
        let entry = self
            .receivers
            .get(usize::from(tag))
            .ok_or(ChannelError::UnknownTag(tag))?;

        let handled = (entry.dispatch)(session.clone(), payload).map_err(
            |source| ChannelError::Decode {
                receiver: entry.name.clone(),
                source,
            },
        )?;
        tracing::trace!(conn_id = %session.id(), tag, receiver = %entry.name, "dispatching frame");
        handled.await;
        Ok(())
    }

    /// Runs `conn` on this channel until it closes.
    ///
    /// The session is registered (and `on_connect` hooks run) only after
    /// the optional schema handshake succeeds.
    pub async fn serve<C: Connection>(
        &self,
        conn: C,
        user: UserId,
        config: &ChannelConfig,
    ) {
        let handshake = config.schema_handshake.then(|| Handshake {
            fingerprint: self.fingerprint,
            timeout: config.handshake_timeout,
        });
        let lifecycle = Lifecycle {
            channel: &self.name,
            registry: &self.registry,
            hooks: &self.hooks,
            dispatch: self,
        };
        lifecycle.serve(conn, user, handshake).await;
    }
}

impl FrameDispatch for Channel {
    async fn dispatch_frame(
        &self,
        session: &Session,
        frame: Frame,
    ) -> Result<(), ChannelError> {
        match frame {
            Frame::Binary(bytes) => self.dispatch(session, &bytes).await,
            Frame::Text(_) => {
                tracing::debug!(conn_id = %session.id(), channel = %self.name, "ignoring text frame on binary channel");
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("destinations", &self.destinations.len())
            .field("receivers", &self.receivers.len())
            .field("fingerprint", &hex::encode(self.fingerprint))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lobbywire_bcs::{int32, string};

    #[test]
    fn test_tags_count_up_per_direction() {
        let mut builder = ChannelBuilder::new("t");
        let a = builder.destination("a", int32());
        let b = builder.destination("b", int32());
        let r0 = builder.receiver("x", int32(), |_, _: i32| async {});
        let c = builder.destination("c", string());
        let r1 = builder.receiver("y", string(), |_, _: String| async {});

        assert_eq!((a.tag(), b.tag(), c.tag()), (0, 1, 2));
        assert_eq!((r0, r1), (0, 1));
    }

    #[test]
    #[should_panic(expected = "at most 256 destinations")]
    fn test_257th_destination_panics() {
        let mut builder = ChannelBuilder::new("t");
        for i in 0..=256 {
            builder.destination(format!("d{i}"), int32());
        }
    }

    #[test]
    fn test_256_receivers_fit() {
        let mut builder = ChannelBuilder::new("t");
        let mut last = 0;
        for i in 0..256 {
            last = builder.receiver(format!("r{i}"), int32(), |_, _: i32| async {});
        }
        assert_eq!(last, 255);
    }

    #[test]
    fn test_fingerprint_depends_on_order() {
        let build = |first: &str, second: &str| {
            let mut builder = ChannelBuilder::new("t");
            builder.destination(first.to_owned(), int32());
            builder.destination(second.to_owned(), string());
            builder.build().fingerprint()
        };
        assert_eq!(build("a", "b"), build("a", "b"));
        assert_ne!(build("a", "b"), build("b", "a"));
    }

    #[test]
    fn test_fingerprint_depends_on_shape() {
        let build = |as_string: bool| {
            let mut builder = ChannelBuilder::new("t");
            if as_string {
                builder.receiver("m", string(), |_, _: String| async {});
            } else {
                builder.receiver("m", int32(), |_, _: i32| async {});
            }
            builder.build().fingerprint()
        };
        assert_ne!(build(true), build(false));
    }

    #[test]
    fn test_schema_text_lists_registrations() {
        let mut builder = ChannelBuilder::new("t");
        builder.destination("chat", string());
        builder.receiver("say", string(), |_, _: String| async {});
        let channel = builder.build();

        assert_eq!(channel.schema(), "out 0 chat string\nin 0 say string\n");
        assert_eq!(channel.destination_tag("chat"), Some(0));
        assert_eq!(channel.receiver_tag("missing"), None);
    }

    #[test]
    fn test_channel_config_default() {
        let config = ChannelConfig::default();
        assert!(!config.schema_handshake);
        assert_eq!(config.handshake_timeout, Duration::from_secs(10));
    }
}
