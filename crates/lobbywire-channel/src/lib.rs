//! Typed, multiplexed channels for lobbywire.
//!
//! This crate turns one WebSocket connection into many typed message
//! streams and keeps track of who is connected:
//!
//! 1. **Registration** ([`ChannelBuilder`]): each outbound kind becomes a
//!    [`Destination`], each inbound kind a receiver with a handler. Tags
//!    are assigned in registration order, per direction, from 0.
//! 2. **Dispatch** ([`Channel::serve`]): one receive loop per connection
//!    reads `[tag][payload]` frames in order and hands decoded values to
//!    their handlers.
//! 3. **Lifecycle** ([`Session`], [`ConnectionRegistry`]): connections are
//!    added before `on_connect` runs and removed before `on_disconnect`
//!    runs; broadcasts iterate a lock-free snapshot.
//! 4. **Identity** ([`Authenticator`]): maps the upgrade request to a
//!    [`UserId`].
//!
//! [`TextChannel`] is the older JSON sibling protocol with the same
//! lifecycle.
//!
//! # How it fits in the stack
//!
//! ```text
//! lobbywire (server, routing)       ← picks a channel per request path
//!     ↕
//! Channel layer (this crate)        ← tags, handlers, sessions, broadcasts
//!     ↕
//! lobbywire-bcs / lobbywire-transport  ← bytes on the wire
//! ```

mod auth;
mod channel;
mod destination;
mod error;
mod lifecycle;
mod registry;
mod session;
mod text;

pub use auth::{
    AnonymousAuthenticator, Authenticator, QueryTokenAuthenticator, UserId,
};
pub use channel::{Channel, ChannelBuilder, ChannelConfig};
pub use destination::{BroadcastReport, Destination};
pub use error::{ChannelError, SendFailure, SessionError};
pub use registry::ConnectionRegistry;
pub use session::{ConnectionState, Session};
pub use text::{
    parse_text_frame, TextChannel, TextChannelBuilder, TextDestination,
};
