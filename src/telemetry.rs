//! Structured logging setup
//!
//! Installs a `tracing-subscriber` fmt subscriber in one of three formats
//! (compact, pretty, json). `RUST_LOG` directives are honored on top of the
//! configured level.

use anyhow::{anyhow, Result};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Build the filter: configured level as default, refined by `RUST_LOG`
pub fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

/// Resolve the effective level; `--verbose` forces DEBUG
pub fn effective_level(logging: &LoggingConfig, verbose: bool) -> Level {
    if verbose {
        return Level::DEBUG;
    }
    logging.level.to_lowercase().parse().unwrap_or(Level::INFO)
}

/// Install the global subscriber
///
/// # Errors
///
/// Fails if a global subscriber is already set.
pub fn init_tracing(logging: &LoggingConfig, verbose: bool) -> Result<()> {
    let filter = env_filter(effective_level(logging, verbose));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match logging.format.to_lowercase().as_str() {
        "json" => builder.json().try_init(),
        "pretty" => builder.pretty().try_init(),
        _ => builder.compact().try_init(),
    };

    result.map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}
