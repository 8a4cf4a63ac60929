//! Port interfaces (traits) for external systems
//!
//! These traits define the boundaries between the application
//! and infrastructure layers.

pub mod config;
pub mod metadata_store;
pub mod object_storage;
pub mod speech_to_text;
pub mod status_store;

// Re-export common types
pub use config::ConfigStore;
pub use metadata_store::{MetadataStore, NewTranscription, StoredFile, TranscriptionEntry};
pub use object_storage::{ObjectStorage, StorageError};
pub use speech_to_text::{ProgressCallback, SpeechError, SpeechToText, TranscriptionProgress};
pub use status_store::{StatusStore, StoreError};
