//! Server configuration, loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file at all) gives a
//! working development server:
//!
//! ```toml
//! bind_addr = "0.0.0.0:9000"
//! ping_interval_secs = 15
//! schema_handshake = true
//!
//! [log]
//! level = "lobbywire=debug,info"
//! format = "json"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use lobbywire_channel::ChannelConfig;
use lobbywire_transport::TransportConfig;
use serde::Deserialize;

/// Errors raised while reading a [`ServerConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,

    #[serde(default = "default_ping_timeout_secs")]
    pub ping_timeout_secs: u64,

    /// Frames queued per connection before sends fail with backpressure.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,

    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,

    /// Seconds a new socket gets to finish the WebSocket upgrade.
    #[serde(default = "default_upgrade_timeout_secs")]
    pub upgrade_timeout_secs: u64,

    /// Require clients to open with the channel's schema fingerprint.
    #[serde(default)]
    pub schema_handshake: bool,

    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,

    #[serde(default)]
    pub log: LogConfig,
}

/// Logging settings; see [`crate::logging::init`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// An `EnvFilter` directive. `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".into()
}

fn default_ping_interval_secs() -> u64 {
    15
}

fn default_ping_timeout_secs() -> u64 {
    30
}

fn default_outbound_queue() -> usize {
    256
}

fn default_max_frame_size() -> usize {
    1 << 20
}

fn default_upgrade_timeout_secs() -> u64 {
    10
}

fn default_handshake_timeout_secs() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            ping_interval_secs: default_ping_interval_secs(),
            ping_timeout_secs: default_ping_timeout_secs(),
            outbound_queue: default_outbound_queue(),
            max_frame_size: default_max_frame_size(),
            upgrade_timeout_secs: default_upgrade_timeout_secs(),
            schema_handshake: false,
            handshake_timeout_secs: default_handshake_timeout_secs(),
            log: LogConfig::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}

impl ServerConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Rejects settings the server cannot run with.
    ///
    /// Called by [`from_toml_str`](Self::from_toml_str) and again by
    /// [`ServerBuilder::build`](crate::ServerBuilder::build), so configs
    /// built in code are checked too.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ping_interval_secs == 0 {
            return Err(ConfigError::Invalid("ping_interval_secs must be positive".into()));
        }
        if self.ping_timeout_secs < self.ping_interval_secs {
            return Err(ConfigError::Invalid(
                "ping_timeout_secs must be at least ping_interval_secs".into(),
            ));
        }
        if self.outbound_queue == 0 {
            return Err(ConfigError::Invalid("outbound_queue must be positive".into()));
        }
        if self.upgrade_timeout_secs == 0 {
            return Err(ConfigError::Invalid("upgrade_timeout_secs must be positive".into()));
        }
        if self.schema_handshake && self.handshake_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "handshake_timeout_secs must be positive when schema_handshake is on".into(),
            ));
        }
        Ok(())
    }

    /// Settings for the WebSocket transport.
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            ping_interval: Duration::from_secs(self.ping_interval_secs),
            ping_timeout: Duration::from_secs(self.ping_timeout_secs),
            outbound_queue: self.outbound_queue,
            max_frame_size: self.max_frame_size,
            upgrade_timeout: Duration::from_secs(self.upgrade_timeout_secs),
        }
    }

    /// Settings passed to every channel the server routes to.
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            schema_handshake: self.schema_handshake,
            handshake_timeout: Duration::from_secs(self.handshake_timeout_secs),
        }
    }
}
