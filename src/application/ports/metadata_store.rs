//! Metadata store port interface

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::ids::{FileId, OwnerId, TranscriptionId};
use crate::domain::storage::StorageLocator;
use crate::domain::transcription::TranscriptionRecord;

use super::status_store::StoreError;

/// File row plus pending record, created together by the upload flow
#[derive(Debug, Clone)]
pub struct NewTranscription {
    pub transcription_id: TranscriptionId,
    pub file_id: FileId,
    pub owner_id: OwnerId,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub storage_locator: StorageLocator,
    pub language: Option<String>,
}

/// Metadata of an uploaded media file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub id: FileId,
    pub owner_id: OwnerId,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub storage_locator: StorageLocator,
    /// Set by compensation once the blob is gone or orphaned
    pub deletable: bool,
    pub created_at: DateTime<Utc>,
}

/// A record joined with its file row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionEntry {
    pub record: TranscriptionRecord,
    pub file: StoredFile,
}

/// Port for file metadata and record lifecycle, always scoped to an owner
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert the file row and its pending record in one transaction.
    /// Fails with `Constraint` if the file already has a record.
    async fn create_transcription(
        &self,
        new: &NewTranscription,
    ) -> Result<TranscriptionRecord, StoreError>;

    async fn find_transcription(
        &self,
        id: TranscriptionId,
        owner: OwnerId,
    ) -> Result<Option<TranscriptionEntry>, StoreError>;

    /// All entries of an owner, newest first.
    async fn list_transcriptions(&self, owner: OwnerId)
        -> Result<Vec<TranscriptionEntry>, StoreError>;

    /// Flag the file row at `locator` as deletable, keeping its record.
    async fn mark_file_deletable(
        &self,
        owner: OwnerId,
        locator: &StorageLocator,
    ) -> Result<bool, StoreError>;

    /// Remove the file row at `locator` together with any record.
    async fn purge_file(&self, owner: OwnerId, locator: &StorageLocator)
        -> Result<bool, StoreError>;

    /// Remove a record and its file row in one transaction.
    async fn delete_transcription(
        &self,
        id: TranscriptionId,
        owner: OwnerId,
    ) -> Result<bool, StoreError>;
}
