//! CLI error type.

use std::fmt;

use pixelview::config::ConfigError;
use pixelview::logging::LoggingError;
use pixelview::source::ConfigurationError;

/// Errors reported by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Bad configuration or arguments.
    Config(String),
    /// The configuration file could not be read or written.
    ConfigFile(ConfigError),
    /// The tile source could not be built.
    Source(ConfigurationError),
    /// Logging could not be set up.
    Logging(LoggingError),
    /// The worker runtime could not be started.
    Runtime(std::io::Error),
    /// Writing the rendered overlay failed.
    Image(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::ConfigFile(e) => write!(f, "Configuration file error: {}", e),
            CliError::Source(e) => write!(f, "Tile source error: {}", e),
            CliError::Logging(e) => write!(f, "Logging error: {}", e),
            CliError::Runtime(e) => write!(f, "Failed to start worker runtime: {}", e),
            CliError::Image(msg) => write!(f, "Image error: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::ConfigFile(e) => Some(e),
            CliError::Source(e) => Some(e),
            CliError::Logging(e) => Some(e),
            CliError::Runtime(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::ConfigFile(e)
    }
}

impl From<ConfigurationError> for CliError {
    fn from(e: ConfigurationError) -> Self {
        CliError::Source(e)
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_display() {
        let err = CliError::Config("bad threads".to_string());
        assert_eq!(err.to_string(), "Configuration error: bad threads");

        let err: CliError = ConfigurationError::UnknownSource("nope".to_string()).into();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_source_chain() {
        let err: CliError = ConfigurationError::NoSource.into();
        assert!(err.source().is_some());
        assert!(CliError::Image("x".to_string()).source().is_none());
    }
}
