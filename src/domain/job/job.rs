//! Transcription job entity

use thiserror::Error;

use crate::domain::error::{InvalidLocatorError, MediaValidationError};
use crate::domain::ids::{FileId, JobId, OwnerId};
use crate::domain::storage::StorageLocator;
use crate::domain::transcription::{InvalidTransition, MediaFile, TranscriptionStatus};

/// Rejection of a job at `add` time. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidJobError {
    #[error("Invalid job: missing {0}")]
    MissingField(&'static str),

    #[error("Invalid job: {0}")]
    InvalidLocator(#[from] InvalidLocatorError),

    #[error("Invalid job: {0}")]
    InvalidMedia(#[from] MediaValidationError),

    #[error("Invalid job: a job with id {0} is already queued or running")]
    Duplicate(JobId),

    #[error("Invalid job: the queue has been shut down")]
    ShutDown,
}

/// Raw input for a new job, as handed over by the upload flow
/// once the transcription record exists.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub transcription_id: JobId,
    pub file_id: FileId,
    pub owner_id: OwnerId,
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub storage_locator: String,
    pub language: Option<String>,
}

/// A queued unit of work: one media file awaiting transcription.
#[derive(Debug, Clone)]
pub struct Job {
    id: JobId,
    file_id: FileId,
    owner_id: OwnerId,
    media: MediaFile,
    storage_locator: StorageLocator,
    language: Option<String>,
    status: TranscriptionStatus,
    retry_count: u32,
}

impl Job {
    /// Structurally validate a new job. The result starts `Pending` with no retries.
    pub fn from_new(new: NewJob) -> Result<Self, InvalidJobError> {
        if new.transcription_id.is_nil() {
            return Err(InvalidJobError::MissingField("id"));
        }
        if new.owner_id.is_nil() {
            return Err(InvalidJobError::MissingField("owner"));
        }
        if new.file_id.is_nil() {
            return Err(InvalidJobError::MissingField("file id"));
        }
        if new.bytes.is_empty() {
            return Err(InvalidJobError::MissingField("file"));
        }
        if new.storage_locator.trim().is_empty() {
            return Err(InvalidJobError::MissingField("storage locator"));
        }

        let storage_locator = StorageLocator::parse(&new.storage_locator)?;
        let media = MediaFile::new(new.file_name, new.bytes)?;
        let language = new.language.filter(|l| !l.trim().is_empty());

        Ok(Self {
            id: new.transcription_id,
            file_id: new.file_id,
            owner_id: new.owner_id,
            media,
            storage_locator,
            language,
            status: TranscriptionStatus::Pending,
            retry_count: 0,
        })
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn file_id(&self) -> FileId {
        self.file_id
    }

    pub fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    pub fn media(&self) -> &MediaFile {
        &self.media
    }

    pub fn storage_locator(&self) -> &StorageLocator {
        &self.storage_locator
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn status(&self) -> TranscriptionStatus {
        self.status
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Move the job's local status along the state machine
    pub fn transition(&mut self, next: TranscriptionStatus) -> Result<(), InvalidTransition> {
        self.status = self.status.transition(next)?;
        Ok(())
    }

    /// Re-enter `Pending` after a failed attempt, consuming one retry
    pub fn requeue(&mut self) -> Result<(), InvalidTransition> {
        if self.status == TranscriptionStatus::Processing {
            self.transition(TranscriptionStatus::Error)?;
        }
        self.transition(TranscriptionStatus::Pending)?;
        self.retry_count += 1;
        Ok(())
    }
}
