//! Unified error type for lobbywire.

use lobbywire_bcs::BcsError;
use lobbywire_channel::{ChannelError, SendFailure, SessionError};
use lobbywire_transport::TransportError;

use crate::config::ConfigError;

/// Top-level error that wraps all crate-specific errors.
///
/// Application code that uses the `lobbywire` meta-crate deals with this
/// one type; `?` converts the sub-crate errors through the `#[from]` impls.
#[derive(Debug, thiserror::Error)]
pub enum LobbywireError {
    /// Socket accept, send or receive.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Encoding or decoding a BCS value.
    #[error(transparent)]
    Bcs(#[from] BcsError),

    /// Frame dispatch, text frames, schema handshake.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Authentication.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A send to one connection failed.
    #[error(transparent)]
    Send(#[from] SendFailure),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
