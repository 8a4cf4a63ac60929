//! ScribeQueue - queued speech-to-text transcription of media files
//!
//! This crate provides a client-resident job pipeline: uploads are stored,
//! recorded and queued, a bounded number of jobs call the speech-to-text
//! service at once, transient failures are retried with backoff, and
//! terminal failures are compensated across storage and metadata.
//!
//! # Architecture
//!
//! The crate follows hexagonal (ports & adapters) architecture:
//!
//! - **Domain**: Identifiers, the status state machine, jobs, media files, config
//! - **Application**: The job queue, processor, status and cleanup services,
//!   the upload/deletion/media use cases, and port interfaces (traits)
//! - **Infrastructure**: Adapter implementations (SQLite, local storage, OpenAI, XDG config)
//! - **CLI**: Command-line interface, argument parsing, and output formatting

pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
