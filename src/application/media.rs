//! Time-limited access to stored media

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::domain::ids::{OwnerId, TranscriptionId};

use super::ports::{MetadataStore, ObjectStorage, StorageError, StoreError};
use super::retry::{retry_with_backoff, Backoff};

/// Timeout for the existence check and for signing
pub const ACCESS_TIMEOUT: Duration = Duration::from_secs(10);

/// Default lifetime of a signed URL
pub const DEFAULT_URL_TTL: Duration = Duration::from_secs(3600);

const SIGN_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Media not found for transcription {0}")]
    NotFound(TranscriptionId),

    #[error("Failed to look up media: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to access media: {0}")]
    Storage(#[from] StorageError),
}

pub struct MediaAccessService {
    metadata: Arc<dyn MetadataStore>,
    storage: Arc<dyn ObjectStorage>,
    timeout: Duration,
    backoff: Backoff,
}

impl MediaAccessService {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        storage: Arc<dyn ObjectStorage>,
        backoff: Backoff,
    ) -> Self {
        Self {
            metadata,
            storage,
            timeout: ACCESS_TIMEOUT,
            backoff,
        }
    }

    /// Signed URL for the media behind a transcription.
    /// Fails with `NotFound` when the record or the object is missing.
    pub async fn signed_url(
        &self,
        id: TranscriptionId,
        owner: OwnerId,
        ttl: Duration,
    ) -> Result<String, MediaError> {
        let entry = self
            .metadata
            .find_transcription(id, owner)
            .await?
            .ok_or(MediaError::NotFound(id))?;
        let locator = &entry.file.storage_locator;

        let storage = &self.storage;
        let timeout = self.timeout;
        let exists = retry_with_backoff("storage exists", SIGN_ATTEMPTS, self.backoff, move || async move {
            tokio::time::timeout(timeout, storage.exists(locator))
                .await
                .map_err(|_| StorageError::Timeout)?
        })
        .await?;
        if !exists {
            debug!(job_id = %id, storage_path = %locator, "Media object missing");
            return Err(MediaError::NotFound(id));
        }

        let url = retry_with_backoff("storage sign", SIGN_ATTEMPTS, self.backoff, move || async move {
            tokio::time::timeout(timeout, storage.signed_url(locator, ttl))
                .await
                .map_err(|_| StorageError::Timeout)?
        })
        .await?;
        Ok(url)
    }
}
