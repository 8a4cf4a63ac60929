//! Application layer - Use cases and port interfaces
//!
//! Contains the job pipeline (queue, processor, status and cleanup
//! services), the surrounding use cases, and trait definitions for
//! external system interactions.

pub mod cleanup;
pub mod deletion;
pub mod media;
pub mod ports;
pub mod processor;
pub mod queue;
pub mod retry;
pub mod status;
pub mod upload;

// Re-export use cases
pub use cleanup::{CleanupService, CompensationError, CompensationOutcome};
pub use deletion::{DeletionError, DeletionService};
pub use media::{MediaAccessService, MediaError};
pub use processor::{AttemptGuard, ProcessError, QueueProcessor};
pub use queue::{JobQueue, JobSnapshot, QueueConfig};
pub use retry::{Backoff, RetryPolicy, Retryable};
pub use status::{StatusService, StatusUpdateError};
pub use upload::{UploadError, UploadReceipt, UploadService};
