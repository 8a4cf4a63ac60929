//! Upload use case: store the media, create the record, enqueue the job

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::error::MediaValidationError;
use crate::domain::ids::{FileId, JobId, OwnerId, TranscriptionId};
use crate::domain::job::{InvalidJobError, NewJob};
use crate::domain::storage::StorageLocator;
use crate::domain::transcription::MediaFile;

use super::cleanup::CleanupService;
use super::ports::{MetadataStore, NewTranscription, ObjectStorage, StorageError, StoreError};
use super::queue::JobQueue;
use super::retry::{retry_with_backoff, Backoff};

/// Attempts for the storage upload
pub const PUT_ATTEMPTS: u32 = 3;

/// Errors from the upload use case
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Invalid file: {0}")]
    Validation(#[from] MediaValidationError),

    #[error("Failed to upload file: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to create transcription record: {0}")]
    Metadata(#[from] StoreError),

    #[error(transparent)]
    Enqueue(#[from] InvalidJobError),
}

/// Identifiers handed back once a file is queued
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub transcription_id: TranscriptionId,
    pub file_id: FileId,
    pub job_id: JobId,
    pub storage_locator: StorageLocator,
}

/// Upload flow ending in `JobQueue::add`
pub struct UploadService {
    storage: Arc<dyn ObjectStorage>,
    metadata: Arc<dyn MetadataStore>,
    cleanup: Arc<CleanupService>,
    queue: JobQueue,
    storage_timeout: Duration,
    backoff: Backoff,
}

impl UploadService {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        metadata: Arc<dyn MetadataStore>,
        cleanup: Arc<CleanupService>,
        queue: JobQueue,
        storage_timeout: Duration,
        backoff: Backoff,
    ) -> Self {
        Self {
            storage,
            metadata,
            cleanup,
            queue,
            storage_timeout,
            backoff,
        }
    }

    /// Validate, store and enqueue one media file.
    ///
    /// Failures after the blob is stored are compensated before returning.
    pub async fn upload(
        &self,
        owner: OwnerId,
        file_name: &str,
        bytes: Vec<u8>,
        language: Option<String>,
    ) -> Result<UploadReceipt, UploadError> {
        let media = MediaFile::new(file_name, bytes)?;
        let locator = StorageLocator::generate(owner, media.file_name());
        info!(
            owner_id = %owner,
            storage_path = %locator,
            size = %media.human_readable_size(),
            "Uploading media"
        );

        self.put(&locator, media.data()).await?;

        let transcription_id = TranscriptionId::new();
        let file_id = FileId::new();
        let language = language.filter(|l| !l.trim().is_empty());
        let new = NewTranscription {
            transcription_id,
            file_id,
            owner_id: owner,
            file_name: media.file_name().to_string(),
            mime_type: media.media_type().as_str().to_string(),
            size_bytes: media.size_bytes() as u64,
            storage_locator: locator.clone(),
            language: language.clone(),
        };

        if let Err(err) = self.metadata.create_transcription(&new).await {
            warn!(owner_id = %owner, storage_path = %locator, error = %err, "Record creation failed");
            self.cleanup.compensate_failed_upload(owner, &locator).await;
            return Err(err.into());
        }

        let file_name = media.file_name().to_string();
        let job = NewJob {
            transcription_id,
            file_id,
            owner_id: owner,
            file_name,
            bytes: media.into_data(),
            storage_locator: locator.to_string(),
            language,
        };

        let job_id = match self.queue.add(job) {
            Ok(id) => id,
            Err(err) => {
                warn!(owner_id = %owner, storage_path = %locator, error = %err, "Enqueue failed");
                self.cleanup.compensate_failed_upload(owner, &locator).await;
                return Err(err.into());
            }
        };

        Ok(UploadReceipt {
            transcription_id,
            file_id,
            job_id,
            storage_locator: locator,
        })
    }

    async fn put(&self, locator: &StorageLocator, data: &[u8]) -> Result<(), StorageError> {
        let storage = &self.storage;
        let timeout = self.storage_timeout;
        retry_with_backoff("storage put", PUT_ATTEMPTS, self.backoff, move || async move {
            tokio::time::timeout(timeout, storage.put(locator, data))
                .await
                .map_err(|_| StorageError::Timeout)?
        })
        .await
    }
}
