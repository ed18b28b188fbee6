//! Log subscriber configuration.

use modgate_core::config::LoggingConfig;
use modgate_core::{Error, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured filter. Fails if a global
/// subscriber is already set.
pub fn configure_tracing(config: &LoggingConfig) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.filter))
        .map_err(|e| Error::Other(anyhow::anyhow!("Invalid log filter '{}': {}", config.filter, e)))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    installed.map_err(|e| Error::Other(anyhow::anyhow!("Failed to install tracing subscriber: {}", e)))
}
