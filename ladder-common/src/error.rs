//! Error types for the ladder allocator.

use thiserror::Error;

/// Unified error type surfaced at the service boundary.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input or request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Persisted state exists but cannot be used
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 400,
            Self::InvalidState(_) => 422,
            Self::Config(_) => 500,
        }
    }
}
