//! Logging setup for the command line tool.
//!
//! Console output goes to stderr so that stdout stays clean for reports and
//! `--json` output. A daily-rotating log file is kept in the platform data
//! directory; if that directory cannot be created, logging continues on the
//! console alone.
//!
//! ```no_run
//! tidyframe::logging::init(false)?;
//! tracing::info!("ready");
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{Context as _, Result};
use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _};

const LOG_FILE_PREFIX: &str = "tidyframe";

/// Gets the log directory path based on platform conventions
///
/// - Windows: `%APPDATA%/tidyframe/logs`
/// - macOS: `~/Library/Application Support/tidyframe/logs`
/// - Linux: `~/.local/share/tidyframe/logs`
///
/// # Errors
///
/// Returns error if there is no data directory or it cannot be created.
pub fn get_log_dir() -> Result<PathBuf> {
    let base_dir = dirs::data_dir().context("Failed to determine data directory")?;
    let log_dir = base_dir.join("tidyframe").join("logs");

    if !log_dir.exists() {
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
    }

    Ok(log_dir)
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` when `verbose`.
fn build_filter(verbose: bool) -> Result<EnvFilter> {
    let default = if verbose { "debug" } else { "info" };
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default))
        .context("Failed to create env filter")
}

fn file_appender() -> Result<(RollingFileAppender, PathBuf)> {
    let log_dir = get_log_dir()?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(10)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .build(&log_dir)
        .context("Failed to create log file appender")?;
    Ok((appender, log_dir))
}

/// Install the global subscriber. Call once, at startup.
///
/// # Errors
///
/// Returns error if the filter is invalid or a subscriber is already set.
pub fn init(verbose: bool) -> Result<()> {
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .without_time()
        .compact();

    let (file_layer, log_dir, file_error) = match file_appender() {
        Ok((appender, dir)) => {
            let layer = fmt::layer()
                .with_target(true)
                .with_line_number(true)
                .with_file(true)
                .with_ansi(false)
                .with_writer(appender);
            (Some(layer), Some(dir), None)
        }
        Err(e) => (None, None, Some(e)),
    };

    tracing_subscriber::registry()
        .with(build_filter(verbose)?)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    match (log_dir, file_error) {
        (Some(dir), _) => tracing::debug!(log_dir = %dir.display(), "Logging initialized"),
        (None, Some(e)) => tracing::debug!("File logging disabled: {e:#}"),
        (None, None) => {}
    }

    Ok(())
}
