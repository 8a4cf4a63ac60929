//! Cleanup service: compensation for failed jobs and uploads

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::domain::ids::OwnerId;
use crate::domain::storage::StorageLocator;

use super::ports::{MetadataStore, ObjectStorage, StorageError, StoreError};
use super::retry::{retry_with_backoff, Backoff};

/// Attempts for each storage delete
pub const DELETE_ATTEMPTS: u32 = 3;

/// A compensation step that failed. Logged, never returned.
#[derive(Debug, Error)]
pub enum CompensationError {
    #[error("Failed to delete storage object {path}: {source}")]
    Storage {
        path: String,
        #[source]
        source: StorageError,
    },

    #[error("Failed to clean up file metadata for {path}: {source}")]
    Metadata {
        path: String,
        #[source]
        source: StoreError,
    },
}

/// What a compensation run achieved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompensationOutcome {
    pub object_deleted: bool,
    pub metadata_cleaned: bool,
}

impl CompensationOutcome {
    pub fn is_complete(&self) -> bool {
        self.object_deleted && self.metadata_cleaned
    }
}

/// Removes orphaned storage objects and metadata rows after failures.
pub struct CleanupService {
    storage: Arc<dyn ObjectStorage>,
    metadata: Arc<dyn MetadataStore>,
    storage_timeout: Duration,
    backoff: Backoff,
}

impl CleanupService {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        metadata: Arc<dyn MetadataStore>,
        storage_timeout: Duration,
        backoff: Backoff,
    ) -> Self {
        Self {
            storage,
            metadata,
            storage_timeout,
            backoff,
        }
    }

    /// Compensate a job that ended in terminal `error`.
    /// The storage object is deleted and the file row flagged deletable;
    /// the record stays so observers still see the failure.
    pub async fn compensate_failed_job(
        &self,
        owner: OwnerId,
        locator: &StorageLocator,
    ) -> CompensationOutcome {
        info!(owner_id = %owner, storage_path = %locator, "Compensating failed job");
        let object_deleted = self.delete_object(locator).await;

        let metadata_cleaned = match self.metadata.mark_file_deletable(owner, locator).await {
            Ok(found) => {
                if !found {
                    warn!(owner_id = %owner, storage_path = %locator, "No file row to flag");
                }
                true
            }
            Err(source) => {
                self.report(CompensationError::Metadata {
                    path: locator.to_string(),
                    source,
                });
                false
            }
        };

        CompensationOutcome {
            object_deleted,
            metadata_cleaned,
        }
    }

    /// Compensate an upload that failed after the blob was stored.
    /// Removes the blob and any file row (and record) at the locator.
    pub async fn compensate_failed_upload(
        &self,
        owner: OwnerId,
        locator: &StorageLocator,
    ) -> CompensationOutcome {
        info!(owner_id = %owner, storage_path = %locator, "Compensating failed upload");
        let object_deleted = self.delete_object(locator).await;

        let metadata_cleaned = match self.metadata.purge_file(owner, locator).await {
            Ok(_) => true,
            Err(source) => {
                self.report(CompensationError::Metadata {
                    path: locator.to_string(),
                    source,
                });
                false
            }
        };

        CompensationOutcome {
            object_deleted,
            metadata_cleaned,
        }
    }

    async fn delete_object(&self, locator: &StorageLocator) -> bool {
        let storage = &self.storage;
        let timeout = self.storage_timeout;
        let result = retry_with_backoff("storage delete", DELETE_ATTEMPTS, self.backoff, move || async move {
            tokio::time::timeout(timeout, storage.delete(locator))
                .await
                .map_err(|_| StorageError::Timeout)?
        })
        .await;

        match result {
            Ok(()) => true,
            Err(source) => {
                self.report(CompensationError::Storage {
                    path: locator.to_string(),
                    source,
                });
                false
            }
        }
    }

    fn report(&self, err: CompensationError) {
        error!(error = %err, "Compensation step failed");
    }
}
