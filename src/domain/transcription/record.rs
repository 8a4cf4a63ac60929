//! Transcription record entity and status updates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::InvalidStatusUpdate;
use crate::domain::ids::{FileId, OwnerId, TranscriptionId};

use super::status::TranscriptionStatus;

/// The persisted, authoritative record of a transcription.
///
/// `content` is `Some` exactly when `status` is `Completed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionRecord {
    pub id: TranscriptionId,
    pub file_id: FileId,
    pub owner_id: OwnerId,
    pub content: Option<String>,
    pub status: TranscriptionStatus,
    pub language: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TranscriptionRecord {
    /// A fresh pending record
    pub fn pending(
        id: TranscriptionId,
        file_id: FileId,
        owner_id: OwnerId,
        language: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            file_id,
            owner_id,
            content: None,
            status: TranscriptionStatus::Pending,
            language,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a validated update in place
    pub fn apply(&mut self, update: &StatusUpdate) {
        self.status = update.status();
        self.content = update.content().map(str::to_string);
        self.updated_at = Utc::now();
    }
}

/// A validated write of status (and content) for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    transcription_id: TranscriptionId,
    file_id: FileId,
    status: TranscriptionStatus,
    content: Option<String>,
}

impl StatusUpdate {
    /// Build an update, enforcing that content accompanies `Completed` and nothing else.
    pub fn new(
        transcription_id: TranscriptionId,
        file_id: FileId,
        status: TranscriptionStatus,
        content: Option<String>,
    ) -> Result<Self, InvalidStatusUpdate> {
        match (status, content) {
            (TranscriptionStatus::Completed, Some(text)) if !text.trim().is_empty() => Ok(Self {
                transcription_id,
                file_id,
                status,
                content: Some(text),
            }),
            (TranscriptionStatus::Completed, _) => Err(InvalidStatusUpdate::MissingContent),
            (other, Some(_)) => Err(InvalidStatusUpdate::UnexpectedContent(other.to_string())),
            (other, None) => Ok(Self {
                transcription_id,
                file_id,
                status: other,
                content: None,
            }),
        }
    }

    pub fn transcription_id(&self) -> TranscriptionId {
        self.transcription_id
    }

    pub fn file_id(&self) -> FileId {
        self.file_id
    }

    pub fn status(&self) -> TranscriptionStatus {
        self.status
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }
}

/// A change notification pushed to observers after a successful write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordChange {
    pub id: TranscriptionId,
    pub owner_id: OwnerId,
    pub status: TranscriptionStatus,
}
