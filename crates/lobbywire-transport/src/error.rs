use crate::ConnectionId;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection {0} closed")]
    ConnectionClosed(ConnectionId),

    /// The connection's outbound queue is full.
    #[error("outbound queue for {0} is full")]
    Backpressure(ConnectionId),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// An inbound frame exceeded the configured limit.
    #[error("frame of {size} bytes exceeds the {max}-byte limit")]
    FrameTooLarge { size: usize, max: usize },

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The transport settings cannot be used.
    #[error("invalid transport config: {0}")]
    InvalidConfig(String),

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}
