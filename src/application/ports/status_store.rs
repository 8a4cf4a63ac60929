//! Status store port interface

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::application::retry::Retryable;
use crate::domain::ids::{FileId, TranscriptionId};
use crate::domain::transcription::{RecordChange, StatusUpdate, TranscriptionRecord};

/// Errors from the status and metadata stores
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Transcription not found: {0}")]
    NotFound(TranscriptionId),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Constraint violated: {0}")]
    Constraint(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl Retryable for StoreError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Port for the authoritative status of transcription records
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Read one record by id.
    async fn read(&self, id: TranscriptionId) -> Result<TranscriptionRecord, StoreError>;

    /// Apply status and content as a single atomic write.
    /// The record is matched on both transcription id and file id.
    ///
    /// A `pending` or `processing` write to a record that is already
    /// `completed` or `error` is ignored and not notified.
    async fn write(&self, update: &StatusUpdate) -> Result<(), StoreError>;

    /// Status-only `processing` echo for an in-flight attempt.
    ///
    /// # Returns
    /// `false` when the record is already terminal and the write was ignored
    async fn write_progress(&self, id: TranscriptionId, file_id: FileId)
        -> Result<bool, StoreError>;

    /// Subscribe to change notifications for every successful write.
    fn subscribe(&self) -> broadcast::Receiver<RecordChange>;
}
