//! Engine error types.

use thiserror::Error;

/// Errors surfaced by the allocation engine.
///
/// Missing indicator data is never an error: it is substituted at the
/// ingestion boundary. Capacity rejections are values, see
/// [`crate::types::RungRejection`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// Persisted user state exists but is malformed
    #[error("invalid user state: {0}")]
    InvalidState(String),

    /// Portfolio snapshot violates a basic numeric precondition
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// Allocator configuration could not be applied
    #[error("allocator config error: {0}")]
    Config(String),
}

impl From<EngineError> for ladder_common::Error {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidState(msg) => ladder_common::Error::InvalidState(msg),
            EngineError::InvalidSnapshot(msg) => ladder_common::Error::InvalidInput(msg),
            EngineError::Config(msg) => ladder_common::Error::Config(msg),
        }
    }
}
