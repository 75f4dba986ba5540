//! Error types for the axcal_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for axcal_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unknown axis key or channel index
    #[error("Not found: {0}")]
    NotFound(String),

    /// Stored axis type disagrees with the descriptor being calibrated
    #[error("Axis type mismatch: {0}")]
    TypeMismatch(String),

    /// No conversion factor exists between two units
    #[error("Incompatible units: cannot convert {from} to {to}")]
    IncompatibleUnits { from: String, to: String },

    /// Wrong value shape or missing required field
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A calibration block is present but cannot be parsed
    #[error("Malformed calibration encoding: {0}")]
    MalformedEncoding(String),
}
