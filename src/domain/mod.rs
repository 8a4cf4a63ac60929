//! Domain layer - Core business logic
//!
//! Contains value objects, entities, the status state machine and domain errors.
//! This layer has no dependencies on external systems.

pub mod config;
pub mod error;
pub mod ids;
pub mod job;
pub mod storage;
pub mod transcription;

// Re-export common types
pub use config::{AppConfig, Duration};
pub use error::*;
pub use ids::{FileId, JobId, OwnerId, TranscriptionId};
pub use job::{InvalidJobError, Job, NewJob};
pub use storage::StorageLocator;
pub use transcription::{
    MediaFile, MediaType, RecordChange, StatusUpdate, TranscriptionRecord, TranscriptionStatus,
};
