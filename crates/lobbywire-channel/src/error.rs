//! Error types for the channel layer.

use lobbywire_bcs::BcsError;
use lobbywire_transport::{ConnectionId, TransportError};

/// Errors raised while authenticating a connection.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The [`Authenticator`](crate::Authenticator) refused the upgrade
    /// request.
    #[error("authentication failed: {0}")]
    AuthFailed(String),
}

/// Enqueueing a frame for one connection failed.
///
/// Broadcasts collect these per connection instead of stopping.
#[derive(Debug, thiserror::Error)]
#[error("send to {connection} failed: {source}")]
pub struct SendFailure {
    /// The connection that didn't get the frame.
    pub connection: ConnectionId,
    /// Why: backpressure or a closed connection.
    #[source]
    pub source: TransportError,
}

/// Errors that can occur while encoding, sending or dispatching frames.
///
/// Inbound variants (`UnknownTag`, `Decode`, `UnknownDestination`,
/// `MalformedTextFrame`, `Json`) concern a single frame: the receive loop
/// logs them and moves on to the next frame.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// An inbound binary frame's tag has no registered receiver.
    #[error("no receiver registered for tag {0}")]
    UnknownTag(u8),

    /// An inbound binary frame had no tag byte at all.
    #[error("empty frame")]
    EmptyFrame,

    /// An inbound payload didn't decode with its receiver's codec.
    #[error("failed to decode `{receiver}` payload: {source}")]
    Decode {
        receiver: String,
        #[source]
        source: BcsError,
    },

    /// An outbound value couldn't be encoded.
    #[error("failed to encode `{destination}` payload: {source}")]
    Encode {
        destination: String,
        #[source]
        source: BcsError,
    },

    /// An inbound text frame named a receiver that isn't registered.
    #[error("no receiver named `{0}`")]
    UnknownDestination(String),

    /// An inbound text frame had no `\n` between name and payload.
    #[error("text frame is missing the name separator")]
    MalformedTextFrame,

    /// A text payload wasn't valid JSON for its receiver's type.
    #[error("invalid JSON for `{name}`: {source}")]
    Json {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// The peer's schema fingerprint didn't match this channel's.
    #[error("schema mismatch: expected {expected}, got {actual}")]
    SchemaMismatch { expected: String, actual: String },

    /// Authentication failed.
    #[error(transparent)]
    Auth(#[from] SessionError),

    /// Enqueueing to a single connection failed.
    #[error(transparent)]
    Send(#[from] SendFailure),
}

impl ChannelError {
    /// Returns `true` for errors caused by one bad inbound frame, which
    /// never close the connection.
    pub fn is_frame_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownTag(_)
                | Self::EmptyFrame
                | Self::Decode { .. }
                | Self::UnknownDestination(_)
                | Self::MalformedTextFrame
                | Self::Json { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_failure_display_names_connection() {
        let failure = SendFailure {
            connection: ConnectionId::new(3),
            source: TransportError::Backpressure(ConnectionId::new(3)),
        };
        let msg = failure.to_string();
        assert!(msg.contains("conn-3"));
        assert!(msg.contains("full"));
    }

    #[test]
    fn test_frame_errors_are_classified() {
        assert!(ChannelError::UnknownTag(9).is_frame_error());
        assert!(ChannelError::MalformedTextFrame.is_frame_error());
        assert!(!ChannelError::Auth(SessionError::AuthFailed("x".into()))
            .is_frame_error());
    }

    #[test]
    fn test_from_session_error() {
        let err: ChannelError = SessionError::AuthFailed("nope".into()).into();
        assert!(matches!(err, ChannelError::Auth(_)));
        assert!(err.to_string().contains("nope"));
    }
}
