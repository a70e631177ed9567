//! Shared logging utilities for RFID Flow binaries.

use anyhow::{Context, Result};
use rfidflow_protocol::defaults::DEFAULT_LOG_FILTER;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Logging configuration shared by RFID Flow binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Filter directive from the config file; `RUST_LOG` still wins
    pub filter: Option<&'a str>,
    /// Directory for the daily log file; `None` logs to stderr only
    pub log_dir: Option<PathBuf>,
    /// Only warnings and errors on stderr (the file keeps the full filter)
    pub quiet: bool,
}

/// Keeps the background file writer alive; flushes on drop.
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Initialize tracing with stderr output and an optional daily rolling file.
pub fn init_logging(config: LogConfig<'_>) -> Result<LogGuard> {
    let filter = resolve_filter(config.filter);
    let env_filter = EnvFilter::try_new(&filter)
        .with_context(|| format!("Invalid log filter: {}", filter))?;

    let mut file_guard = None;
    let file_layer = match &config.log_dir {
        Some(dir) => {
            ensure_dir(dir)?;
            let file_appender =
                tracing_appender::rolling::daily(dir, format!("{}.log", sanitize_name(config.app_name)));
            let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
            file_guard = Some(guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(file_writer)
                    .with_ansi(false)
                    .with_filter(env_filter.clone()),
            )
        }
        None => None,
    };

    let console_filter = if config.quiet {
        EnvFilter::new("warn")
    } else {
        env_filter
    };
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LogGuard { _file: file_guard })
}

/// Pick the effective filter: `RUST_LOG`, then the configured one, then the default.
pub fn resolve_filter(configured: Option<&str>) -> String {
    if let Ok(env) = std::env::var(EnvFilter::DEFAULT_ENV) {
        if !env.trim().is_empty() {
            return env;
        }
    }
    configured
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .unwrap_or(DEFAULT_LOG_FILTER)
        .to_string()
}

/// Get the logs directory: ~/.rfidflow/logs
pub fn logs_dir() -> PathBuf {
    rfidflow_protocol::paths::rfidflow_home().join("logs")
}

fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create logs directory: {}", dir.display()))
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect()
}
