//! Tracing subscriber setup for binaries and tests that embed the engine.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

/// Installs a global subscriber.
///
/// `RUST_LOG` wins over `config.filter` when set. Returns false if a global
/// subscriber was already installed, which is not an error.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let layer = if config.json {
        fmt::layer()
            .with_target(true)
            .with_ansi(false)
            .json()
            .with_filter(filter)
            .boxed()
    } else {
        fmt::layer().with_target(true).with_filter(filter).boxed()
    };

    let installed = tracing_subscriber::registry().with(layer).try_init().is_ok();
    if installed {
        tracing::debug!(json = config.json, filter = %config.filter, "Logging initialized");
    } else {
        tracing::debug!("Global tracing subscriber already set, keeping it");
    }
    installed
}
