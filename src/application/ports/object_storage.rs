//! Object storage port interface

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::application::retry::Retryable;
use crate::domain::storage::StorageLocator;

/// Object storage errors
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Storage I/O failed: {0}")]
    Io(String),

    #[error("Storage operation timed out")]
    Timeout,

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl Retryable for StorageError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Timeout | Self::Unavailable(_))
    }
}

/// Port for blob storage of uploaded media
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store bytes at `locator`, replacing any existing object.
    async fn put(&self, locator: &StorageLocator, bytes: &[u8]) -> Result<(), StorageError>;

    /// Delete the object at `locator`. An absent object is not an error.
    async fn delete(&self, locator: &StorageLocator) -> Result<(), StorageError>;

    async fn exists(&self, locator: &StorageLocator) -> Result<bool, StorageError>;

    /// Generate a time-limited access URL.
    async fn signed_url(&self, locator: &StorageLocator, ttl: Duration)
        -> Result<String, StorageError>;
}
