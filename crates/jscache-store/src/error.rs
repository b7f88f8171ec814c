//! Error types for blob storage.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::lock::LockError;

/// Store result type
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from blob store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid cache key: {0:?}")]
    InvalidKey(String),

    #[error("invalid entry metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("store is locked by another process (waited {0:?})")]
    Locked(Duration),
}

impl From<LockError> for StoreError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Timeout(waited) => StoreError::Locked(waited),
            LockError::Io(e) => StoreError::Io(e),
        }
    }
}
