//! Tile-source error types.

use thiserror::Error;

/// Failure while computing a single tile.
///
/// Always recovered per tile by the dispatcher: logged, never cached, never
/// surfaced to the paint caller.
#[derive(Debug, Error)]
pub enum TileComputeError {
    /// Reading source pixels failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested region cannot be served.
    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    /// The classifier itself failed.
    #[error("Classifier error: {0}")]
    Classifier(String),

    /// The compute function panicked on the worker.
    #[error("Tile computation panicked: {0}")]
    Panicked(String),
}

/// The overlay cannot be used with the current image or source.
///
/// `paint_overlay` treats this as "nothing to draw".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// No tile source has been attached.
    #[error("No tile source configured")]
    NoSource,

    /// The source does not support the image.
    #[error("Source '{source_name}' does not support this image: {reason}")]
    Unsupported { source_name: String, reason: String },

    /// A source parameter could not be parsed.
    #[error("Invalid value '{value}' for parameter '{name}'")]
    InvalidParameter { name: String, value: String },

    /// No builder registered under the requested name.
    #[error("Unknown tile source '{0}'")]
    UnknownSource(String),
}
