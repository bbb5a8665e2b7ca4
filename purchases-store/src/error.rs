//! Error types for store operations.

use bincode::error::{DecodeError, EncodeError};
use feoxdb::FeoxError;
use thiserror::Error;

/// Error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Internal store error, state or computation error.
    #[error(transparent)]
    InternalError(Box<dyn std::error::Error + Send + Sync>),

    /// The blocking worker running the operation failed.
    #[error("store task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

/// Errors that can occur when opening a [`FeOxDbStore`](crate::FeOxDbStore).
#[derive(Debug, Error)]
pub enum FeOxDbError {
    /// An error from the underlying FeOxDB database.
    #[error("FeOxDB error: {0}")]
    FeOxDb(#[from] FeoxError),

    /// Failed to encode a domain index.
    #[error("Serialization error: {0}")]
    Serialization(#[from] EncodeError),

    /// Failed to decode a domain index.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] DecodeError),
}

impl From<FeOxDbError> for StoreError {
    fn from(error: FeOxDbError) -> Self {
        Self::InternalError(Box::new(error))
    }
}
