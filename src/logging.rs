//! Logging setup for the `filesorter` binary.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the binary (or to tests that want to see the output).

use std::fs::{self, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "filesorter=info";
const VERBOSE_LOG_FILTER: &str = "filesorter=debug";

/// Logging options taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Log at debug level unless `RUST_LOG` says otherwise.
    pub verbose: bool,
    /// Also append plain-text log lines to this file.
    pub log_file: Option<PathBuf>,
}

/// Chooses the filter: `RUST_LOG` wins, then `--verbose`, then the default.
pub fn build_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            VERBOSE_LOG_FILTER
        } else {
            DEFAULT_LOG_FILTER
        })
    })
}

/// Installs the global subscriber: stderr always, plus the log file if one
/// is configured.
///
/// # Errors
///
/// Fails if the log file cannot be opened or a subscriber is already set.
pub fn init_logging(config: &LogConfig) -> io::Result<()> {
    let file_layer = match &config.log_file {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(build_filter(config.verbose))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(io::Error::other)
}
