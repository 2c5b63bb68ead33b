//! Per-connection transport settings.

use std::time::Duration;

use crate::TransportError;

/// Configuration applied to every accepted connection.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// How often the writer pings an otherwise idle peer.
    pub ping_interval: Duration,

    /// How long the peer may stay silent (no frame, no pong) before the
    /// connection is closed with reason `"ping timeout"`.
    pub ping_timeout: Duration,

    /// Capacity of each connection's outbound queue. A full queue fails
    /// sends with [`TransportError::Backpressure`](crate::TransportError)
    /// instead of blocking the caller.
    pub outbound_queue: usize,

    /// Largest inbound frame accepted, in bytes.
    pub max_frame_size: usize,

    /// How long a new socket may take to complete the WebSocket upgrade
    /// before it is dropped.
    pub upgrade_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(15),
            ping_timeout: Duration::from_secs(30),
            outbound_queue: 256,
            max_frame_size: 1 << 20,
            upgrade_timeout: Duration::from_secs(10),
        }
    }
}

impl TransportConfig {
    /// Rejects settings the writer task cannot run with.
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.ping_interval.is_zero() {
            return Err(TransportError::InvalidConfig(
                "ping_interval must be positive".into(),
            ));
        }
        if self.ping_timeout < self.ping_interval {
            return Err(TransportError::InvalidConfig(
                "ping_timeout must be at least ping_interval".into(),
            ));
        }
        if self.outbound_queue == 0 {
            return Err(TransportError::InvalidConfig(
                "outbound_queue must be positive".into(),
            ));
        }
        if self.upgrade_timeout.is_zero() {
            return Err(TransportError::InvalidConfig(
                "upgrade_timeout must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_config_default() {
        let config = TransportConfig::default();
        assert_eq!(config.ping_interval, Duration::from_secs(15));
        assert_eq!(config.ping_timeout, Duration::from_secs(30));
        assert_eq!(config.outbound_queue, 256);
        assert_eq!(config.max_frame_size, 1_048_576);
        assert_eq!(config.upgrade_timeout, Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_ping_interval_is_invalid() {
        let config = TransportConfig {
            ping_interval: Duration::ZERO,
            ..TransportConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(TransportError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_ping_timeout_shorter_than_interval_is_invalid() {
        let config = TransportConfig {
            ping_interval: Duration::from_secs(10),
            ping_timeout: Duration::from_secs(1),
            ..TransportConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
