//! The per-connection receive loop shared by binary and text channels.
//!
//! ```text
//! [schema handshake] → add to registry → on_connect hooks
//!     → recv/dispatch loop (one frame fully handled before the next)
//!     → remove from registry → on_disconnect hooks
//! ```
//!
//! Hooks and dispatch for one connection run on that connection's task,
//! so they never overlap. Different connections run on different tasks.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use lobbywire_transport::{Connection, Frame};

use crate::{ChannelError, ConnectionRegistry, Session, UserId};

pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

type Hook = Box<dyn Fn(Session) -> BoxFuture + Send + Sync>;

/// Connect and disconnect callbacks, run in registration order.
#[derive(Default)]
pub(crate) struct Hooks {
    on_connect: Vec<Hook>,
    on_disconnect: Vec<Hook>,
}

impl Hooks {
    pub(crate) fn on_connect<F, Fut>(&mut self, hook: F)
    where
        F: Fn(Session) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_connect
            .push(Box::new(move |s: Session| -> BoxFuture { Box::pin(hook(s)) }));
    }

    pub(crate) fn on_disconnect<F, Fut>(&mut self, hook: F)
    where
        F: Fn(Session) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_disconnect
            .push(Box::new(move |s: Session| -> BoxFuture { Box::pin(hook(s)) }));
    }

    async fn connected(&self, session: &Session) {
        for hook in &self.on_connect {
            hook(session.clone()).await;
        }
    }

    async fn disconnected(&self, session: &Session) {
        for hook in &self.on_disconnect {
            hook(session.clone()).await;
        }
    }
}

/// What a channel does with one inbound frame.
pub(crate) trait FrameDispatch: Send + Sync {
    fn dispatch_frame(
        &self,
        session: &Session,
        frame: Frame,
    ) -> impl Future<Output = Result<(), ChannelError>> + Send;
}

/// Expected first frame when the schema handshake is on.
pub(crate) struct Handshake {
    pub(crate) fingerprint: [u8; 8],
    pub(crate) timeout: Duration,
}

/// Everything a receive loop needs from its channel.
pub(crate) struct Lifecycle<'a, D> {
    pub(crate) channel: &'a str,
    pub(crate) registry: &'a ConnectionRegistry,
    pub(crate) hooks: &'a Hooks,
    pub(crate) dispatch: &'a D,
}

/// Removes the session from the registry however the loop exits,
/// including a panicking handler.
struct Registered<'a> {
    registry: &'a ConnectionRegistry,
    session: &'a Session,
}

impl Drop for Registered<'_> {
    fn drop(&mut self) {
        self.session.close("connection finished");
        self.registry.remove(self.session.id());
    }
}

impl<D: FrameDispatch> Lifecycle<'_, D> {
    /// Runs one connection from open to close.
    pub(crate) async fn serve<C: Connection>(
        &self,
        mut conn: C,
        user: UserId,
        handshake: Option<Handshake>,
    ) {
        let session = Session::new(user, conn.request().clone(), conn.sender());
        let conn_id = session.id();
        let channel = self.channel;

        if let Some(handshake) = handshake {
            if let Err(e) = check_handshake(&mut conn, &handshake).await {
                tracing::warn!(%conn_id, %user, channel, error = %e, "rejecting connection");
                session.close("schema mismatch");
                return;
            }
        }

        self.registry.add(session.clone());
        let guard = Registered {
            registry: self.registry,
            session: &session,
        };
        tracing::info!(%conn_id, %user, channel, "connection opened");
        self.hooks.connected(&session).await;

        loop {
            let frame = match conn.recv().await {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(%conn_id, error = %e, "receive failed");
                    break;
                }
            };
            if !session.is_open() {
                tracing::trace!(%conn_id, "discarding frame on closing connection");
                continue;
            }
            if let Err(e) = self.dispatch.dispatch_frame(&session, frame).await {
                log_dispatch_error(&session, channel, &e);
            }
        }

        drop(guard);
        tracing::info!(
            %conn_id,
            %user,
            channel,
            reason = session.close_reason().as_deref().unwrap_or("unknown"),
            "connection closed"
        );
        self.hooks.disconnected(&session).await;
    }
}

fn log_dispatch_error(session: &Session, channel: &str, error: &ChannelError) {
    let conn_id = session.id();
    match error {
        ChannelError::UnknownTag(tag) => {
            tracing::warn!(%conn_id, channel, tag, "dropping frame with unknown tag");
        }
        e if e.is_frame_error() => {
            tracing::debug!(%conn_id, channel, error = %e, "dropping malformed frame");
        }
        e => {
            tracing::warn!(%conn_id, channel, error = %e, "frame handling failed");
        }
    }
}

async fn check_handshake<C: Connection>(
    conn: &mut C,
    handshake: &Handshake,
) -> Result<(), ChannelError> {
    let expected = handshake.fingerprint;
    let actual = match tokio::time::timeout(handshake.timeout, conn.recv()).await {
        Ok(Ok(Some(Frame::Binary(bytes)))) if bytes[..] == expected[..] => {
            return Ok(());
        }
        Ok(Ok(Some(Frame::Binary(bytes)))) => hex::encode(&bytes),
        Ok(Ok(Some(Frame::Text(_)))) => "a text frame".to_owned(),
        Ok(Ok(None)) => "a closed connection".to_owned(),
        Ok(Err(_)) => "a receive error".to_owned(),
        Err(_) => "nothing before the timeout".to_owned(),
    };
    Err(ChannelError::SchemaMismatch {
        expected: hex::encode(expected),
        actual,
    })
}
