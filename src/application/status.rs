//! Status service: the only writer of record status and content

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

use crate::domain::error::InvalidStatusUpdate;
use crate::domain::ids::{FileId, TranscriptionId};
use crate::domain::transcription::{
    RecordChange, StatusUpdate, TranscriptionRecord, TranscriptionStatus,
};

use super::ports::{StatusStore, StoreError};
use super::retry::Retryable;

/// Errors from a status write
#[derive(Debug, Clone, Error)]
pub enum StatusUpdateError {
    #[error("Status store write failed: {0}")]
    Store(#[from] StoreError),

    #[error("Status store did not respond within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    InvalidUpdate(#[from] InvalidStatusUpdate),
}

impl Retryable for StatusUpdateError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_retryable(),
            Self::Timeout(_) => true,
            Self::InvalidUpdate(_) => false,
        }
    }
}

/// Narrow transactional boundary over the status store.
pub struct StatusService {
    store: Arc<dyn StatusStore>,
    timeout: Duration,
}

impl StatusService {
    pub fn new(store: Arc<dyn StatusStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Write status (and content, for `Completed`) as one atomic update.
    pub async fn update_status(
        &self,
        id: TranscriptionId,
        file_id: FileId,
        status: TranscriptionStatus,
        content: Option<String>,
    ) -> Result<(), StatusUpdateError> {
        let update = StatusUpdate::new(id, file_id, status, content)?;
        tokio::time::timeout(self.timeout, self.store.write(&update))
            .await
            .map_err(|_| StatusUpdateError::Timeout(self.timeout))??;
        debug!(job_id = %id, status = %status, "Status updated");
        Ok(())
    }

    /// Forward an in-flight progress event as a status-only `processing` write.
    ///
    /// # Returns
    /// `false` if the store already holds a terminal status
    pub async fn report_progress(
        &self,
        id: TranscriptionId,
        file_id: FileId,
    ) -> Result<bool, StatusUpdateError> {
        let applied = tokio::time::timeout(self.timeout, self.store.write_progress(id, file_id))
            .await
            .map_err(|_| StatusUpdateError::Timeout(self.timeout))??;
        Ok(applied)
    }

    /// Read the authoritative record
    pub async fn current(&self, id: TranscriptionId) -> Result<TranscriptionRecord, StatusUpdateError> {
        let record = tokio::time::timeout(self.timeout, self.store.read(id))
            .await
            .map_err(|_| StatusUpdateError::Timeout(self.timeout))??;
        Ok(record)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecordChange> {
        self.store.subscribe()
    }
}
