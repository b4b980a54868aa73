//! Logging setup
//!
//! Everything goes to the log file; `--verbose` mirrors it to stderr.

use jiff::Zoned;
use std::fs::{self, File, OpenOptions};
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use thiserror::Error;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

static INSTALLED: OnceLock<()> = OnceLock::new();

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    Filter(String),
    #[error("failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to install log subscriber: {0}")]
    Subscriber(String),
}

/// Local wall-clock time with milliseconds
#[derive(Debug, Clone, Copy, Default)]
struct LocalTime;

impl FormatTime for LocalTime {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Zoned::now().strftime("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

fn default_directive(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "info" }
}

fn open_log_file(path: &Path) -> Result<File, TelemetryError> {
    let log_file_error = |source| TelemetryError::LogFile {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(log_file_error)?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(log_file_error)
}

/// Install the global subscriber; later calls are no-ops
///
/// `RUST_LOG` takes precedence over the level implied by `verbose`.
pub fn init(log_file: &Path, verbose: bool) -> Result<(), TelemetryError> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) => EnvFilter::try_new(directives),
        Err(_) => EnvFilter::try_new(default_directive(verbose)),
    }
    .map_err(|e| TelemetryError::Filter(e.to_string()))?;

    let file = open_log_file(log_file)?;

    let file_layer = fmt::layer()
        .with_timer(LocalTime)
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(file));

    let console_layer = verbose.then(|| {
        fmt::layer()
            .with_timer(LocalTime)
            .with_target(false)
            .with_writer(io::stderr)
            .with_ansi(io::stderr().is_terminal())
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| TelemetryError::Subscriber(e.to_string()))?;

    let _ = INSTALLED.set(());
    tracing::info!("{}", "=".repeat(80));
    Ok(())
}
