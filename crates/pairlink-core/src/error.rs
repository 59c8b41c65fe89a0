//! Error types for pairlink

use thiserror::Error;

/// Main error type for pairlink setup and configuration
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Data directory not found")]
    NoDataDir,
}

/// Result type alias using pairlink's Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }
}
