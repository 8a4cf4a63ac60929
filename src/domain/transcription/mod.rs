//! Transcription domain module

mod media_file;
mod record;
mod status;

pub use media_file::{MediaFile, MediaType, MAX_UPLOAD_BYTES};
pub use record::{RecordChange, StatusUpdate, TranscriptionRecord};
pub use status::{InvalidTransition, TranscriptionStatus, ALL_STATUSES};
