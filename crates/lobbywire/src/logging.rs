//! Installs the global `tracing` subscriber.

use tracing_subscriber::EnvFilter;

use crate::config::{LogConfig, LogFormat};

/// Installs a stderr subscriber filtered by `RUST_LOG`, falling back to
/// `config.level`.
///
/// Returns `false` if a global subscriber was already set (tests, or a host
/// application that configured its own); that is not an error.
pub fn init(config: &LogConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    let installed = match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        let config = LogConfig::default();
        let _ = init(&config);
        assert!(!init(&config));
    }
}
