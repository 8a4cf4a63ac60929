//! Shared fixtures: scripted speech-to-text and a fully wired in-memory pipeline

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use scribe_queue::application::ports::{
    MetadataStore, ObjectStorage, ProgressCallback, SpeechError, SpeechToText, StatusStore,
    TranscriptionProgress,
};
use scribe_queue::application::{
    Backoff, CleanupService, DeletionService, JobQueue, JobSnapshot, MediaAccessService,
    QueueConfig, QueueProcessor, RetryPolicy, StatusService, UploadReceipt, UploadService,
};
use scribe_queue::domain::ids::{OwnerId, TranscriptionId};
use scribe_queue::domain::transcription::MediaFile;
use scribe_queue::infrastructure::{InMemoryObjectStore, InMemoryStore};

/// What one call to the fake adapter does
#[derive(Debug, Clone)]
pub enum Outcome {
    Text(String),
    Fail(SpeechError),
    /// Never returns
    Hang,
}

pub fn text(s: &str) -> Outcome {
    Outcome::Text(s.to_string())
}

/// Speech-to-text fake that plays back outcomes in call order
pub struct ScriptedSpeech {
    script: Mutex<VecDeque<Outcome>>,
    fallback: Outcome,
    latency: Duration,
    calls: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
    last_callback: Mutex<Option<ProgressCallback>>,
}

impl ScriptedSpeech {
    pub fn new(fallback: Outcome) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            latency: Duration::from_millis(50),
            calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            last_callback: Mutex::new(None),
        }
    }

    pub fn scripted(outcomes: Vec<Outcome>, fallback: Outcome) -> Self {
        let speech = Self::new(fallback);
        *speech.script.lock() = outcomes.into();
        speech
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed running at once
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Progress callback handed to the most recent call
    pub fn last_callback(&self) -> Option<ProgressCallback> {
        self.last_callback.lock().clone()
    }
}

#[async_trait]
impl SpeechToText for ScriptedSpeech {
    async fn transcribe(
        &self,
        _media: &MediaFile,
        _language: Option<&str>,
        on_progress: ProgressCallback,
    ) -> Result<String, SpeechError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        *self.last_callback.lock() = Some(on_progress.clone());

        let outcome = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        on_progress(TranscriptionProgress::new(0));
        tokio::time::sleep(self.latency).await;
        on_progress(TranscriptionProgress::new(50));

        let result = match outcome {
            Outcome::Text(text) => Ok(text),
            Outcome::Fail(err) => Err(err),
            Outcome::Hang => std::future::pending().await,
        };
        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

pub fn queue_config(concurrency: usize, max_retries: u32) -> QueueConfig {
    QueueConfig {
        concurrency,
        tick_interval: Duration::from_secs(5),
        retry: RetryPolicy::new(
            max_retries,
            Backoff::new(Duration::from_secs(1), Duration::from_secs(10)),
        ),
        stuck_after: None,
    }
}

/// The whole pipeline over in-memory adapters
pub struct Harness {
    pub owner: OwnerId,
    pub store: Arc<InMemoryStore>,
    pub storage: Arc<InMemoryObjectStore>,
    pub speech: Arc<ScriptedSpeech>,
    pub status: Arc<StatusService>,
    pub queue: JobQueue,
    pub upload: UploadService,
    pub deletion: DeletionService,
    pub media: MediaAccessService,
}

impl Harness {
    pub fn new(speech: ScriptedSpeech, config: QueueConfig) -> Self {
        Self::with_transcribe_timeout(speech, config, Duration::from_secs(600))
    }

    pub fn with_transcribe_timeout(
        speech: ScriptedSpeech,
        config: QueueConfig,
        transcribe_timeout: Duration,
    ) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let storage = Arc::new(InMemoryObjectStore::new());
        let speech = Arc::new(speech);

        let status_store: Arc<dyn StatusStore> = store.clone();
        let metadata: Arc<dyn MetadataStore> = store.clone();
        let objects: Arc<dyn ObjectStorage> = storage.clone();
        let backoff = config.retry.backoff;
        let storage_timeout = Duration::from_secs(10);

        let status = Arc::new(StatusService::new(status_store, Duration::from_secs(10)));
        let cleanup = Arc::new(CleanupService::new(
            objects.clone(),
            metadata.clone(),
            storage_timeout,
            backoff,
        ));
        let processor = Arc::new(QueueProcessor::new(
            status.clone(),
            speech.clone(),
            cleanup.clone(),
            transcribe_timeout,
        ));
        let queue = JobQueue::start(processor, config);

        Self {
            owner: OwnerId::new(),
            upload: UploadService::new(
                objects.clone(),
                metadata.clone(),
                cleanup,
                queue.clone(),
                storage_timeout,
                backoff,
            ),
            deletion: DeletionService::new(
                metadata.clone(),
                objects.clone(),
                queue.clone(),
                storage_timeout,
            ),
            media: MediaAccessService::new(metadata, objects, backoff),
            store,
            storage,
            speech,
            status,
            queue,
        }
    }

    pub async fn upload(&self, file_name: &str) -> UploadReceipt {
        self.upload
            .upload(self.owner, file_name, b"fake audio".to_vec(), None)
            .await
            .expect("upload should succeed")
    }

    /// Poll the queue until the job reaches a terminal status
    pub async fn settle(&self, id: TranscriptionId) -> JobSnapshot {
        for _ in 0..10_000 {
            if let Some(snapshot) = self.queue.snapshot(id) {
                if snapshot.status.is_terminal() {
                    return snapshot;
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("job {} never settled", id);
    }
}
