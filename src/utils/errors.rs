// src/utils/errors.rs
//! Error types shared across the engine

use crate::store::StoreError;
use thiserror::Error;

/// Engine result type
pub type Result<T> = std::result::Result<T, RecorderError>;

/// Errors raised by recording, page, commit and copy operations
#[derive(Debug, Error)]
pub enum RecorderError {
    /// Access control rejected the caller
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A mutating operation was attempted on a closed recording
    #[error("recording {0} is not open")]
    NotOpen(String),

    /// Lookup-then-mutate found nothing
    #[error("not found: {0}")]
    NotFound(String),

    /// The owner has no storage backend configured
    #[error("no storage configured for {0}")]
    StorageUnavailable(String),

    /// The storage backend rejected or failed an upload (retryable)
    #[error("upload failed: {0}")]
    UploadFailed(String),

    /// The backend has not finished an asynchronous upload yet (retryable)
    #[error("not yet available: {0}")]
    NotYetAvailable(String),

    /// Some files could not be deleted while destroying a recording
    #[error("failed to delete {} file(s): {}", .0.len(), .0.join(", "))]
    PartialDelete(Vec<String>),

    /// A caller used a name the file registry reserves for itself
    #[error("{0} is a reserved name")]
    ReservedName(String),

    /// The owning collection was dropped while the recording was still in use
    #[error("owner of recording {0} is gone")]
    OwnerGone(String),

    #[error("metadata store error: {0}")]
    Store(#[from] StoreError),

    #[error("storage backend error: {0}")]
    StorageFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for RecorderError {
    fn from(e: config::ConfigError) -> Self {
        RecorderError::Config(e.to_string())
    }
}

impl RecorderError {
    /// Whether re-running the same operation later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RecorderError::UploadFailed(_) | RecorderError::NotYetAvailable(_)
        )
    }
}
