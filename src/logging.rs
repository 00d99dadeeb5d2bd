//! Structured logging
//!
//! Builds a `tracing` [`Dispatch`] writing to stderr, as plain text or JSON.
//! `RUST_LOG` takes precedence over the configured level. Nothing here
//! installs a global subscriber; callers scope the dispatch with
//! [`tracing::dispatcher::with_default`] or hand it to a
//! [`PluginManager`](crate::control::PluginManager).

use std::io;

use tracing::Dispatch;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

use crate::config::{LogConfig, LogFormat};

/// Builds a dispatch for `config`
pub fn dispatch(config: &LogConfig) -> Dispatch {
    let registry = tracing_subscriber::registry().with(env_filter(&config.level));

    match config.format {
        LogFormat::Text => Dispatch::new(
            registry.with(
                fmt::layer()
                    .with_writer(io::stderr)
                    .with_target(false),
            ),
        ),
        LogFormat::Json => Dispatch::new(
            registry.with(
                fmt::layer()
                    .json()
                    .with_writer(io::stderr)
                    .with_ansi(false),
            ),
        ),
    }
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}
