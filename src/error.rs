//! Error types for the Windowgate service.

use thiserror::Error;

use crate::store::StoreError;

/// Main error type for service-level operations.
#[derive(Error, Debug)]
pub enum WindowgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Counter store setup errors
    #[error("Counter store error: {0}")]
    Store(#[from] StoreError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for WindowgateError {
    fn from(e: config::ConfigError) -> Self {
        WindowgateError::Config(e.to_string())
    }
}

/// Result type alias for service-level operations.
pub type Result<T> = std::result::Result<T, WindowgateError>;
