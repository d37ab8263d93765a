//! Structured logging setup using `tracing-subscriber` and `tracing-appender`.
//!
//! The relay daemon logs JSON to a daily-rotated file and text to stderr
//! ([`init_production`]). One-shot subcommands log to stderr only
//! ([`init_cli`]).

use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// File name prefix of the rotated relay log.
pub const LOG_FILE_PREFIX: &str = "relaybot.log";

/// Filter used when `RUST_LOG` is unset or invalid.
const DEFAULT_FILTER: &str = "info";

/// Keeps the background log writer alive.
///
/// Dropping it flushes buffered entries, so hold it until the relay exits.
pub struct LoggingGuard {
    _writer: WorkerGuard,
}

/// Install the relay's logging: JSON into `{logs_dir}/relaybot.log.YYYY-MM-DD`
/// and human-readable lines on stderr.
///
/// # Errors
///
/// Fails if `logs_dir` cannot be created or a global subscriber is already
/// installed.
pub fn init_production(logs_dir: &Path) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("failed to create logs directory {}", logs_dir.display()))?;

    let (file_writer, writer_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX));

    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().json().with_writer(file_writer))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(LoggingGuard {
        _writer: writer_guard,
    })
}

/// Install stderr-only logging. Returns whether this call installed it.
pub fn init_cli() -> bool {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .try_init();
    if let Err(e) = installed {
        tracing::debug!(error = %e, "subscriber already installed, keeping it");
        return false;
    }
    true
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}
