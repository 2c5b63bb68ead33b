//! The legacy text channel: `"<name>\n<json>"` frames.
//!
//! An older, simpler sibling of the binary [`Channel`](crate::Channel).
//! Message kinds are matched by name instead of by tag, and payloads are
//! JSON via `serde_json`, so registration order doesn't matter here.
//! Sessions, the registry and hooks work exactly as on binary channels.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use lobbywire_transport::{Connection, ConnectionId, Frame};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::destination::broadcast;
use crate::lifecycle::{BoxFuture, FrameDispatch, Hooks, Lifecycle};
use crate::{
    BroadcastReport, ChannelError, ConnectionRegistry, Session, UserId,
};

type TextDispatch = Box<
    dyn Fn(Session, &str) -> Result<BoxFuture, serde_json::Error> + Send + Sync,
>;

fn check_name(name: &str) {
    assert!(
        !name.is_empty() && !name.contains('\n'),
        "text message names must be non-empty and single-line, got {name:?}"
    );
}

/// Splits a text frame into its name and JSON payload.
pub fn parse_text_frame(frame: &str) -> Result<(&str, &str), ChannelError> {
    frame
        .split_once('\n')
        .filter(|(name, _)| !name.is_empty())
        .ok_or(ChannelError::MalformedTextFrame)
}

// ---------------------------------------------------------------------------
// TextDestination
// ---------------------------------------------------------------------------

/// A named outbound message kind on a text channel.
pub struct TextDestination<T> {
    name: Arc<str>,
    registry: Arc<ConnectionRegistry>,
    _marker: PhantomData<fn(&T)>,
}

impl<T> Clone for TextDestination<T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            registry: Arc::clone(&self.registry),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for TextDestination<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextDestination")
            .field("name", &self.name)
            .finish()
    }
}

impl<T: Serialize> TextDestination<T> {
    /// The name written before the payload.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renders `value` as a complete text frame.
    pub fn frame(&self, value: &T) -> Result<String, ChannelError> {
        let json = serde_json::to_string(value).map_err(|source| {
            ChannelError::Json {
                name: self.name.to_string(),
                source,
            }
        })?;
        Ok(format!("{}\n{json}", self.name))
    }

    /// Sends `value` to one connection.
    pub fn to_connection(
        &self,
        session: &Session,
        value: &T,
    ) -> Result<(), ChannelError> {
        session.send(Frame::Text(self.frame(value)?))?;
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
        let frame = Frame::Text(self.frame(value)?);
        Ok(broadcast(&self.registry, &self.name, &frame, filter))
    }
}

// ---------------------------------------------------------------------------
// TextChannelBuilder / TextChannel
// ---------------------------------------------------------------------------

/// Registers a text channel's message kinds, then freezes them.
pub struct TextChannelBuilder {
    name: String,
    registry: Arc<ConnectionRegistry>,
    destinations: Vec<Arc<str>>,
    receivers: HashMap<String, TextDispatch>,
    hooks: Hooks,
}

impl TextChannelBuilder {
    /// Starts an empty text channel called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registry: Arc::new(ConnectionRegistry::new()),
            destinations: Vec::new(),
            receivers: HashMap::new(),
            hooks: Hooks::default(),
        }
    }

    /// The registry the built channel will use.
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Registers an outbound message kind.
    ///
    /// # Panics
    /// If `name` is empty, contains a newline, or is already registered.
    pub fn destination<T: Serialize>(
        &mut self,
        name: impl Into<String>,
    ) -> TextDestination<T> {
        let name: Arc<str> = Arc::from(name.into());
        check_name(&name);
        assert!(
            !self.destinations.contains(&name),
            "text destination {name:?} registered twice"
        );
        self.destinations.push(Arc::clone(&name));
        TextDestination {
            name,
            registry: Arc::clone(&self.registry),
            _marker: PhantomData,
        }
    }

    /// Registers an inbound message kind.
    ///
    /// # Panics
    /// If `name` is empty, contains a newline, or is already registered.
    pub fn receiver<T, F, Fut>(
        &mut self,
        name: impl Into<String>,
        handler: F,
    ) -> &mut Self
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(Session, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        check_name(&name);
        assert!(
            !self.receivers.contains_key(&name),
            "text receiver {name:?} registered twice"
        );
        let dispatch: TextDispatch = Box::new(
            move |session: Session, json: &str| -> Result<BoxFuture, serde_json::Error> {
                let value = serde_json::from_str(json)?;
                Ok(Box::pin(handler(session, value)))
            },
        );
        self.receivers.insert(name, dispatch);
        self
    }

    /// See [`ChannelBuilder::on_connect`](crate::ChannelBuilder::on_connect).
    pub fn on_connect<F, Fut>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(Session) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hooks.on_connect(hook);
        self
    }

    /// See [`ChannelBuilder::on_disconnect`](crate::ChannelBuilder::on_disconnect).
    pub fn on_disconnect<F, Fut>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(Session) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hooks.on_disconnect(hook);
        self
    }

    /// Freezes the registrations.
    pub fn build(self) -> Arc<TextChannel> {
        tracing::info!(
            channel = %self.name,
            destinations = self.destinations.len(),
            receivers = self.receivers.len(),
            "text channel built"
        );
        Arc::new(TextChannel {
            name: self.name,
            registry: self.registry,
            receivers: self.receivers,
            hooks: self.hooks,
        })
    }
}

/// A built text channel.
pub struct TextChannel {
    name: String,
    registry: Arc<ConnectionRegistry>,
    receivers: HashMap<String, TextDispatch>,
    hooks: Hooks,
}

impl TextChannel {
    /// Shorthand for [`TextChannelBuilder::new`].
    pub fn builder(name: impl Into<String>) -> TextChannelBuilder {
        TextChannelBuilder::new(name)
    }

    /// The channel's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The live connections on this channel.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Parses one text frame and runs its receiver's handler.
    ///
    /// # Errors
    /// `MalformedTextFrame` without a name line, `UnknownDestination` for
    /// an unregistered name, `Json` if the payload doesn't deserialize.
    pub async fn dispatch(
        &self,
        session: &Session,
        frame: &str,
    ) -> Result<(), ChannelError> {
        let (name, json) = parse_text_frame(frame)?;
        let dispatch = self
            .receivers
            .get(name)
            .ok_or_else(|| ChannelError::UnknownDestination(name.to_owned()))?;
        let handled = dispatch(session.clone(), json).map_err(|source| {
            ChannelError::Json {
                name: name.to_owned(),
                source,
            }
        })?;
        handled.await;
        Ok(())
    }

    /// Runs `conn` on this channel until it closes.
    pub async fn serve<C: Connection>(&self, conn: C, user: UserId) {
        let lifecycle = Lifecycle {
            channel: &self.name,
            registry: &self.registry,
            hooks: &self.hooks,
            dispatch: self,
        };
        lifecycle.serve(conn, user, None).await;
    }
}

impl FrameDispatch for TextChannel {
    async fn dispatch_frame(
        &self,
        session: &Session,
        frame: Frame,
    ) -> Result<(), ChannelError> {
        match frame {
            Frame::Text(text) => self.dispatch(session, &text).await,
            Frame::Binary(_) => {
                tracing::debug!(conn_id = %session.id(), channel = %self.name, "ignoring binary frame on text channel");
                Ok(())
            }
        }
    }
}

impl fmt::Debug for TextChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextChannel")
            .field("name", &self.name)
            .field("receivers", &self.receivers.len())
            .finish()
    }
}
