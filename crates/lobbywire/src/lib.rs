//! # lobbywire
//!
//! Typed, multiplexed binary channels over WebSocket, with a canonical
//! BCS encoding for every value on the wire.
//!
//! A server routes each request path to a [`Channel`] (binary, tag
//! multiplexed) or a [`TextChannel`] (the legacy `name\njson` protocol).
//! Applications register what they send ([`Destination`]) and what they
//! receive (handlers) on a channel builder, then hand the built channel
//! to the [`Server`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lobbywire::prelude::*;
//!
//! # async fn run() -> Result<(), LobbywireError> {
//! let config = ServerConfig::from_toml_str("bind_addr = \"0.0.0.0:8080\"")?;
//! lobbywire::logging::init(&config.log);
//!
//! let mut lobby = Channel::builder("lobby");
//! let joined = lobby.destination("joined", uint64());
//! lobby.on_connect(move |session: Session| {
//!     let joined = joined.clone();
//!     async move {
//!         let _ = joined.to_all(&session.user().0);
//!     }
//! });
//!
//! Server::builder()
//!     .config(config)
//!     .route("/lobby", lobby.build())
//!     .build()
//!     .await?
//!     .run()
//!     .await
//! # }
//! ```

pub mod config;
mod error;
pub mod logging;
mod server;

pub use config::{ConfigError, LogConfig, LogFormat, ServerConfig};
pub use error::LobbywireError;
pub use server::{Endpoint, Routes, ServeFuture, Server, ServerBuilder, ShutdownHandle};

pub use lobbywire_bcs as bcs;
pub use lobbywire_channel::{
    AnonymousAuthenticator, Authenticator, BroadcastReport, Channel, ChannelBuilder,
    ChannelConfig, ChannelError, ConnectionRegistry, ConnectionState, Destination,
    QueryTokenAuthenticator, SendFailure, Session, SessionError, TextChannel,
    TextChannelBuilder, TextDestination, UserId,
};
pub use lobbywire_transport::{
    ConnectionId, Frame, TransportConfig, TransportError, UpgradeRequest,
};

/// Everything an application usually needs, codecs included.
pub mod prelude {
    pub use crate::bcs::{
        boolean, bytes, decode, encode, enumeration, field, float32, float64, int32,
        int64, list, map, mapped, nullable, string, structure, tuple, uint16, uint32,
        uint64, uint8, uleb128, unit, BcsError, Codec, IndexMap,
    };
    pub use crate::{
        AnonymousAuthenticator, Authenticator, BroadcastReport, Channel, ChannelConfig,
        ChannelError, ConnectionId, ConnectionState, Destination, LobbywireError,
        QueryTokenAuthenticator, SendFailure, Server, ServerBuilder, ServerConfig,
        Session, SessionError, ShutdownHandle, TextChannel, TextDestination,
        UpgradeRequest, UserId,
    };
}
