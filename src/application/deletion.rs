//! User-initiated deletion of a transcription

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::ids::{OwnerId, TranscriptionId};

use super::ports::{MetadataStore, ObjectStorage, StorageError, StoreError};
use super::queue::JobQueue;

#[derive(Debug, Error)]
pub enum DeletionError {
    #[error("Transcription not found: {0}")]
    NotFound(TranscriptionId),

    #[error("Failed to delete transcription: {0}")]
    Store(#[from] StoreError),
}

/// Removes a transcription, its queued job, its blob and its file row.
pub struct DeletionService {
    metadata: Arc<dyn MetadataStore>,
    storage: Arc<dyn ObjectStorage>,
    queue: JobQueue,
    storage_timeout: Duration,
}

impl DeletionService {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        storage: Arc<dyn ObjectStorage>,
        queue: JobQueue,
        storage_timeout: Duration,
    ) -> Self {
        Self {
            metadata,
            storage,
            queue,
            storage_timeout,
        }
    }

    /// Delete the transcription `id` owned by `owner`.
    /// A failed storage delete is logged and the record is deleted anyway.
    pub async fn delete(&self, id: TranscriptionId, owner: OwnerId) -> Result<(), DeletionError> {
        let entry = self
            .metadata
            .find_transcription(id, owner)
            .await?
            .ok_or(DeletionError::NotFound(id))?;

        if self.queue.remove(id) {
            info!(job_id = %id, "Removed job from queue");
        }

        let locator = &entry.file.storage_locator;
        let deleted = tokio::time::timeout(self.storage_timeout, self.storage.delete(locator))
            .await
            .map_err(|_| StorageError::Timeout)
            .and_then(|result| result);
        if let Err(err) = deleted {
            warn!(job_id = %id, storage_path = %locator, error = %err, "Storage delete failed, continuing");
        }

        if !self.metadata.delete_transcription(id, owner).await? {
            return Err(DeletionError::NotFound(id));
        }
        info!(job_id = %id, owner_id = %owner, "Transcription deleted");
        Ok(())
    }
}
