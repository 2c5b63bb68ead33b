//! `Server` builder and accept loop.
//!
//! The server ties the layers together:
//!
//! ```text
//! accept (transport) → route by path → authenticate → Endpoint::serve_connection
//! ```
//!
//! Each accepted connection runs on its own Tokio task, so a slow
//! authenticator or a busy channel never holds up the accept loop.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use lobbywire_channel::{
    Authenticator, Channel, ChannelConfig, QueryTokenAuthenticator, TextChannel,
    UserId,
};
use lobbywire_transport::{Connection, Transport, WebSocketTransport};
use tokio::sync::watch;

use crate::{LobbywireError, ServerConfig};

/// Future returned by [`Endpoint::serve_connection`].
pub type ServeFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Something a request path can be routed to.
///
/// Implemented for [`Channel`] and [`TextChannel`]; the server holds
/// endpoints as trait objects so one server can mix both protocols.
pub trait Endpoint<C>: Send + Sync + 'static {
    /// Runs `conn` until it closes.
    fn serve_connection(
        self: Arc<Self>,
        conn: C,
        user: UserId,
        config: ChannelConfig,
    ) -> ServeFuture;
}

impl<C: Connection> Endpoint<C> for Channel {
    fn serve_connection(
        self: Arc<Self>,
        conn: C,
        user: UserId,
        config: ChannelConfig,
    ) -> ServeFuture {
        Box::pin(async move { Channel::serve(&self, conn, user, &config).await })
    }
}

/// Text channels have no schema handshake, so `config` is unused.
impl<C: Connection> Endpoint<C> for TextChannel {
    fn serve_connection(
        self: Arc<Self>,
        conn: C,
        user: UserId,
        _config: ChannelConfig,
    ) -> ServeFuture {
        Box::pin(async move { TextChannel::serve(&self, conn, user).await })
    }
}

/// Request path to endpoint.
pub type Routes<C> = HashMap<String, Arc<dyn Endpoint<C>>>;

/// Builder for configuring and starting a lobbywire server.
///
/// # Example
///
/// ```rust,no_run
/// use lobbywire::prelude::*;
///
/// # async fn run() -> Result<(), LobbywireError> {
/// let mut lobby = Channel::builder("lobby");
/// let chat = lobby.destination("chat", string());
/// lobby.receiver("say", string(), move |_session, text: String| {
///     let chat = chat.clone();
///     async move {
///         let _ = chat.to_all(&text);
///     }
/// });
///
/// let server = Server::builder()
///     .bind("0.0.0.0:8080")
///     .route("/lobby", lobby.build())
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct ServerBuilder<A = QueryTokenAuthenticator> {
    config: ServerConfig,
    routes: Routes<<WebSocketTransport as Transport>::Connection>,
    auth: A,
}

impl ServerBuilder {
    /// Creates a builder with default settings and the development
    /// [`QueryTokenAuthenticator`].
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            routes: HashMap::new(),
            auth: QueryTokenAuthenticator,
        }
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Authenticator + Send + Sync + 'static> ServerBuilder<A> {
    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Replaces the whole configuration, bind address included.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Routes upgrade requests for `path` to `endpoint`.
    ///
    /// # Panics
    /// If `path` is already routed.
    pub fn route<E>(mut self, path: impl Into<String>, endpoint: Arc<E>) -> Self
    where
        E: Endpoint<<WebSocketTransport as Transport>::Connection>,
    {
        let path = path.into();
        assert!(
            !self.routes.contains_key(&path),
            "path {path:?} is already routed"
        );
        self.routes.insert(path, endpoint);
        self
    }

    /// Replaces the authenticator.
    pub fn authenticator<B>(self, auth: B) -> ServerBuilder<B>
    where
        B: Authenticator + Send + Sync + 'static,
    {
        ServerBuilder {
            config: self.config,
            routes: self.routes,
            auth,
        }
    }

    /// Validates the configuration and binds the WebSocket listener.
    pub async fn build(self) -> Result<Server<WebSocketTransport, A>, LobbywireError> {
        self.config.validate()?;
        let transport =
            WebSocketTransport::bind(&self.config.bind_addr, self.config.transport_config())
                .await?;
        Ok(Server::with_transport(transport, self.auth, self.routes, &self.config))
    }
}

/// State shared by every connection task.
struct Shared<C, A> {
    routes: Routes<C>,
    auth: A,
    channel_config: ChannelConfig,
}

/// A bound lobbywire server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct Server<T: Transport = WebSocketTransport, A = QueryTokenAuthenticator> {
    transport: T,
    shared: Arc<Shared<T::Connection, A>>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Server {
    /// Creates a new builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }
}

impl<T, A> Server<T, A>
where
    T: Transport,
    A: Authenticator + Send + Sync + 'static,
    LobbywireError: From<T::Error>,
{
    /// Runs the server on an already bound transport.
    pub fn with_transport(
        transport: T,
        auth: A,
        routes: Routes<T::Connection>,
        config: &ServerConfig,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            transport,
            shared: Arc::new(Shared {
                routes,
                auth,
                channel_config: config.channel_config(),
            }),
            shutdown: Arc::new(shutdown),
        }
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, LobbywireError> {
        Ok(self.transport.local_addr()?)
    }

    /// A handle that stops [`run()`](Self::run) from another task.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.shutdown))
    }

    /// Runs the accept loop until [`ShutdownHandle::shutdown`] is called.
    ///
    /// Connections already being served keep running; only new ones are
    /// refused.
    pub async fn run(mut self) -> Result<(), LobbywireError> {
        let mut stop = self.shutdown.subscribe();
        let paths: Vec<&str> = self.shared.routes.keys().map(String::as_str).collect();
        tracing::info!(?paths, "lobbywire server running");

        loop {
            if *stop.borrow_and_update() {
                break;
            }
            let accepted = tokio::select! {
                accepted = self.transport.accept() => accepted,
                _ = stop.changed() => break,
            };
            match accepted {
                Ok(conn) => {
                    let shared = Arc::clone(&self.shared);
                    tokio::spawn(handle_connection(conn, shared));
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }

        self.transport.shutdown().await?;
        tracing::info!("lobbywire server stopped");
        Ok(())
    }
}

/// Stops a running [`Server`].
#[derive(Debug, Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    /// Stops accepting connections. Idempotent.
    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }
}

async fn handle_connection<C, A>(conn: C, shared: Arc<Shared<C, A>>)
where
    C: Connection,
    A: Authenticator + Send + Sync + 'static,
{
    let conn_id = conn.id();
    let path = conn.request().path.clone();

    let Some(endpoint) = shared.routes.get(&path).cloned() else {
        tracing::warn!(%conn_id, %path, "no endpoint for path");
        conn.sender().close("unknown path");
        return;
    };

    let request = conn.request().clone();
    let user = match shared.auth.authenticate(&request).await {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!(%conn_id, %path, error = %e, "authentication failed");
            conn.sender().close("unauthorized");
            return;
        }
    };

    tracing::debug!(%conn_id, %user, %path, "routing connection");
    endpoint
        .serve_connection(conn, user, shared.channel_config.clone())
        .await;
}
