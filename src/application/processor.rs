//! Queue processor: runs one job attempt end to end

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::ids::{FileId, JobId, OwnerId};
use crate::domain::job::Job;
use crate::domain::storage::StorageLocator;
use crate::domain::transcription::TranscriptionStatus;

use super::cleanup::CleanupService;
use super::ports::{ProgressCallback, SpeechError, SpeechToText, TranscriptionProgress};
use super::retry::Retryable;
use super::status::{StatusService, StatusUpdateError};

/// Per-attempt failure, tagged retryable or not
#[derive(Debug, Clone, Error)]
pub enum ProcessError {
    #[error("Transcription failed: {0}")]
    Speech(#[from] SpeechError),

    #[error("Transcription timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transcription returned no text")]
    EmptyTranscript,

    #[error("Could not record status: {0}")]
    Status(#[from] StatusUpdateError),

    #[error("Attempt was superseded after running too long")]
    Superseded,
}

impl Retryable for ProcessError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Speech(e) => e.is_retryable(),
            Self::Timeout(_) | Self::Status(_) => true,
            Self::EmptyTranscript | Self::Superseded => false,
        }
    }
}

const OPEN: u8 = 0;
const CLOSED: u8 = 1;
const SUPERSEDED: u8 = 2;

/// One-shot latch deciding who writes the terminal status of an attempt.
///
/// While open, progress events may be forwarded. The processor closes it
/// before its terminal write; the stuck-job sweep supersedes it instead.
/// Exactly one of the two wins.
#[derive(Debug, Default)]
pub struct AttemptGuard {
    state: AtomicU8,
}

impl AttemptGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.state.load(Ordering::Acquire) == OPEN
    }

    pub fn is_superseded(&self) -> bool {
        self.state.load(Ordering::Acquire) == SUPERSEDED
    }

    /// Claim the terminal write for the processor
    pub fn claim(&self) -> bool {
        self.transition(CLOSED)
    }

    /// Claim the terminal write for the sweep
    pub fn supersede(&self) -> bool {
        self.transition(SUPERSEDED)
    }

    fn transition(&self, to: u8) -> bool {
        self.state
            .compare_exchange(OPEN, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Identity of a dispatched job, kept by the queue while the job itself
/// is owned by the running attempt.
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub id: JobId,
    pub file_id: FileId,
    pub owner_id: OwnerId,
    pub storage_locator: StorageLocator,
}

impl From<&Job> for JobHandle {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id(),
            file_id: job.file_id(),
            owner_id: job.owner_id(),
            storage_locator: job.storage_locator().clone(),
        }
    }
}

/// Executes a single job attempt: status transitions, the speech-to-text
/// call, and compensation when the failure is terminal.
pub struct QueueProcessor {
    status: Arc<StatusService>,
    speech: Arc<dyn SpeechToText>,
    cleanup: Arc<CleanupService>,
    transcribe_timeout: Duration,
}

impl QueueProcessor {
    pub fn new(
        status: Arc<StatusService>,
        speech: Arc<dyn SpeechToText>,
        cleanup: Arc<CleanupService>,
        transcribe_timeout: Duration,
    ) -> Self {
        Self {
            status,
            speech,
            cleanup,
            transcribe_timeout,
        }
    }

    /// Run one attempt of `job`.
    ///
    /// Only the forward path is written here: `processing`, then `completed`
    /// on success. A failure leaves the record as it is; the queue decides
    /// whether the job goes back to `pending` (`requeue`) or ends in `error`
    /// (`fail`).
    ///
    /// # Returns
    /// The transcript text on success
    pub async fn process(
        &self,
        job: &Job,
        guard: &Arc<AttemptGuard>,
    ) -> Result<String, ProcessError> {
        let id = job.id();
        let file_id = job.file_id();
        let attempt = job.retry_count() + 1;
        info!(job_id = %id, owner_id = %job.owner_id(), attempt, "Processing job");

        if let Err(err) = self
            .status
            .update_status(id, file_id, TranscriptionStatus::Processing, None)
            .await
        {
            warn!(job_id = %id, attempt, error = %err, "Failed to mark job processing");
            if !guard.claim() {
                return Err(ProcessError::Superseded);
            }
            return Err(ProcessError::Status(err));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();
        let forwarder = self.spawn_progress_forwarder(id, file_id, guard.clone(), rx, stop.clone());
        let on_progress: ProgressCallback = Arc::new(move |progress: TranscriptionProgress| {
            let _ = tx.send(progress);
        });
        let outcome = self.transcribe(job, on_progress).await;

        // Once claimed no further progress write starts; wait out one in flight
        let claimed = guard.claim();
        stop.cancel();
        if let Err(err) = forwarder.await {
            debug!(job_id = %id, error = %err, "Progress forwarder ended abnormally");
        }
        if !claimed {
            info!(job_id = %id, "Attempt superseded, dropping its result");
            return Err(ProcessError::Superseded);
        }

        let text = outcome?;
        self.status
            .update_status(id, file_id, TranscriptionStatus::Completed, Some(text.clone()))
            .await?;
        info!(job_id = %id, attempt, chars = text.len(), "Job completed");
        Ok(text)
    }

    /// Put the record back to `pending` ahead of another attempt.
    pub async fn requeue(&self, job: &Job, err: &ProcessError) {
        let id = job.id();
        let attempt = job.retry_count() + 1;
        warn!(job_id = %id, attempt, error = %err, "Attempt failed, will retry");
        if let Err(write_err) = self
            .status
            .update_status(id, job.file_id(), TranscriptionStatus::Pending, None)
            .await
        {
            warn!(job_id = %id, error = %write_err, "Failed to mark job pending for retry");
        }
    }

    /// Terminal failure: `error` (best effort) followed by compensation.
    pub async fn fail(&self, handle: &JobHandle, err: &ProcessError) {
        error!(job_id = %handle.id, owner_id = %handle.owner_id, error = %err, "Job failed permanently");
        if let Err(write_err) = self
            .status
            .update_status(handle.id, handle.file_id, TranscriptionStatus::Error, None)
            .await
        {
            warn!(job_id = %handle.id, error = %write_err, "Failed to mark job as error");
        }
        self.cleanup
            .compensate_failed_job(handle.owner_id, &handle.storage_locator)
            .await;
    }

    /// Terminalize a job the stuck-job sweep took over: `error` plus compensation.
    pub async fn supersede(&self, handle: &JobHandle) {
        warn!(job_id = %handle.id, owner_id = %handle.owner_id, "Job stuck in processing, forcing error");
        self.fail(handle, &ProcessError::Superseded).await;
    }

    async fn transcribe(
        &self,
        job: &Job,
        on_progress: ProgressCallback,
    ) -> Result<String, ProcessError> {
        let call = self.speech.transcribe(job.media(), job.language(), on_progress);
        match tokio::time::timeout(self.transcribe_timeout, call).await {
            Err(_) => Err(ProcessError::Timeout(self.transcribe_timeout)),
            Ok(Err(err)) => Err(ProcessError::Speech(err)),
            Ok(Ok(text)) if text.trim().is_empty() => Err(ProcessError::EmptyTranscript),
            Ok(Ok(text)) => Ok(text),
        }
    }

    /// Forward progress events as status-only writes while the guard is open.
    fn spawn_progress_forwarder(
        &self,
        id: JobId,
        file_id: FileId,
        guard: Arc<AttemptGuard>,
        mut rx: mpsc::UnboundedReceiver<TranscriptionProgress>,
        stop: CancellationToken,
    ) -> JoinHandle<()> {
        let status = self.status.clone();
        tokio::spawn(async move {
            loop {
                let progress = tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    next = rx.recv() => match next {
                        Some(progress) => progress,
                        None => break,
                    },
                };
                if !guard.is_open() {
                    break;
                }
                match status.report_progress(id, file_id).await {
                    Ok(true) => debug!(job_id = %id, percent = progress.percent, "Progress forwarded"),
                    Ok(false) => {
                        debug!(job_id = %id, "Record already terminal, ignoring progress");
                        break;
                    }
                    Err(err) => warn!(job_id = %id, error = %err, "Failed to forward progress"),
                }
            }
        })
    }
}
