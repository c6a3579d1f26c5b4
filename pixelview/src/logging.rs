//! Logging setup.
//!
//! Logs go to stderr and, when a directory is configured, to a log file
//! written by a background thread. Keep the returned guard alive for the
//! life of the program or buffered file output is lost.

use std::path::PathBuf;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Default log file name inside the log directory.
pub const DEFAULT_LOG_FILE: &str = "pixelview.log";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("logging already initialized: {0}")]
    AlreadyInitialized(String),
}

/// How logging should be set up.
#[derive(Debug, Clone)]
pub struct LoggingOptions {
    /// Log at debug level and honour `RUST_LOG`.
    pub verbose: bool,
    /// Directory for the log file; stderr only when `None`.
    pub directory: Option<PathBuf>,
    pub file_name: String,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            directory: None,
            file_name: DEFAULT_LOG_FILE.to_string(),
        }
    }
}

impl LoggingOptions {
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_directory(mut self, directory: Option<PathBuf>) -> Self {
        self.directory = directory;
        self
    }
}

/// Level used when `RUST_LOG` does not apply.
fn default_level(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

/// Build the level filter.
///
/// Without `verbose` the level is fixed at `info` whatever `RUST_LOG` says,
/// so a stray environment variable cannot flood the output.
pub fn build_filter(verbose: bool) -> EnvFilter {
    let level = default_level(verbose);
    if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    } else {
        EnvFilter::new(level)
    }
}

/// Install the global subscriber.
///
/// Returns the file writer guard when a log directory is configured.
pub fn init_logging(options: &LoggingOptions) -> Result<Option<WorkerGuard>, LoggingError> {
    let (file_layer, guard) = match &options.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory).map_err(|source| {
                LoggingError::CreateDirectory {
                    path: directory.clone(),
                    source,
                }
            })?;
            let appender = tracing_appender::rolling::never(directory, &options.file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(build_filter(options.verbose))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_level() {
        assert_eq!(default_level(true), "debug");
        assert_eq!(default_level(false), "info");
    }

    #[test]
    fn test_quiet_filter_ignores_env() {
        let filter = build_filter(false);
        assert_eq!(filter.to_string(), "info");
    }

    #[test]
    fn test_options_builder() {
        let options = LoggingOptions::default()
            .verbose(true)
            .with_directory(Some(PathBuf::from("/tmp/logs")));
        assert!(options.verbose);
        assert_eq!(options.file_name, DEFAULT_LOG_FILE);
        assert_eq!(options.directory, Some(PathBuf::from("/tmp/logs")));
    }

    #[test]
    fn test_unwritable_directory_reported() {
        let temp = tempfile::TempDir::new().unwrap();
        let file = temp.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();

        let options = LoggingOptions::default().with_directory(Some(file.join("logs")));
        let err = init_logging(&options).unwrap_err();
        assert!(matches!(err, LoggingError::CreateDirectory { .. }));
    }
}
