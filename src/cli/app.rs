//! App runners: service wiring and the per-command flows

use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::application::ports::{
    ConfigStore, MetadataStore, ObjectStorage, SpeechToText, StatusStore, StorageError,
    StoreError,
};
use crate::application::{
    Backoff, CleanupService, DeletionService, JobQueue, MediaAccessService, QueueConfig,
    QueueProcessor, RetryPolicy, StatusService, UploadService,
};
use crate::domain::config::{AppConfig, QueueSection};
use crate::domain::ids::{OwnerId, TranscriptionId};
use crate::domain::transcription::TranscriptionStatus;
use crate::infrastructure::{LocalObjectStore, OpenAiTranscriber, SqliteStore, XdgConfigStore};

use super::args::{Cli, Commands};
use super::presenter::Presenter;

/// Exit codes
pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_ERROR: u8 = 1;
pub const EXIT_USAGE_ERROR: u8 = 2;

const DATABASE_FILE: &str = "scribe-queue.db";
const OBJECTS_DIR: &str = "objects";

/// Fallback poll of the queue while waiting for change notifications
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Errors raised while wiring services
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Missing owner id. Run 'scribe-queue config init' or set SCRIBE_QUEUE_OWNER")]
    MissingOwner,

    #[error("Missing API key. Set OPENAI_API_KEY environment variable or run 'scribe-queue config set api_key <key>'")]
    MissingApiKey,

    #[error("Failed to create data directory {path}: {message}")]
    DataDir { path: String, message: String },

    #[error("Failed to open database: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to open media storage: {0}")]
    Storage(#[from] StorageError),
}

/// Everything one CLI invocation needs, built from the merged config
pub struct Services {
    pub owner: OwnerId,
    pub metadata: Arc<dyn MetadataStore>,
    pub status: Arc<StatusService>,
    pub queue: JobQueue,
    pub upload: UploadService,
    pub deletion: DeletionService,
    pub media: MediaAccessService,
}

impl Services {
    /// Open the store and storage and start the job queue.
    ///
    /// Unset `database_url` and `storage_dir` default to locations under `data_dir`.
    pub async fn build(config: &AppConfig, data_dir: &Path) -> Result<Self, AppError> {
        let owner = config.owner().ok_or(AppError::MissingOwner)?;

        let database_url = match config.database_url.clone() {
            Some(url) => url,
            None => {
                ensure_dir(data_dir).await?;
                format!("sqlite://{}", data_dir.join(DATABASE_FILE).display())
            }
        };
        let storage_dir = config
            .storage_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join(OBJECTS_DIR));

        let store = Arc::new(SqliteStore::connect(&database_url).await?);
        let storage: Arc<dyn ObjectStorage> = Arc::new(LocalObjectStore::open(storage_dir).await?);
        let speech: Arc<dyn SpeechToText> = Arc::new(
            OpenAiTranscriber::new(config.api_key.clone().unwrap_or_default())
                .with_model(config.model_or_default())
                .with_base_url(config.api_base_url_or_default()),
        );
        let status_store: Arc<dyn StatusStore> = store.clone();
        let metadata: Arc<dyn MetadataStore> = store;

        let backoff = Backoff::new(
            config.retry_base_delay_or_default().as_std(),
            config.retry_max_delay_or_default().as_std(),
        );
        let storage_timeout = config.storage_timeout_or_default().as_std();

        let status = Arc::new(StatusService::new(
            status_store,
            config.store_timeout_or_default().as_std(),
        ));
        let cleanup = Arc::new(CleanupService::new(
            storage.clone(),
            metadata.clone(),
            storage_timeout,
            backoff,
        ));
        let processor = Arc::new(QueueProcessor::new(
            status.clone(),
            speech,
            cleanup.clone(),
            config.transcribe_timeout_or_default().as_std(),
        ));
        let queue = JobQueue::start(processor, queue_config(config, backoff));

        Ok(Self {
            owner,
            upload: UploadService::new(
                storage.clone(),
                metadata.clone(),
                cleanup,
                queue.clone(),
                storage_timeout,
                backoff,
            ),
            deletion: DeletionService::new(
                metadata.clone(),
                storage.clone(),
                queue.clone(),
                storage_timeout,
            ),
            media: MediaAccessService::new(metadata.clone(), storage, backoff),
            metadata,
            status,
            queue,
        })
    }
}

fn queue_config(config: &AppConfig, backoff: Backoff) -> QueueConfig {
    QueueConfig {
        concurrency: config.concurrency_or_default(),
        tick_interval: config.tick_interval_or_default().as_std(),
        retry: RetryPolicy::new(config.max_retries_or_default(), backoff),
        stuck_after: config.stuck_after().map(|d| d.as_std()),
    }
}

async fn ensure_dir(path: &Path) -> Result<(), AppError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| AppError::DataDir {
            path: path.display().to_string(),
            message: e.to_string(),
        })
}

/// Run a non-config subcommand
pub async fn run(cli: Cli) -> ExitCode {
    let mut presenter = Presenter::new();
    let config_store = XdgConfigStore::new();
    let config = load_merged_config(&config_store, cli_config(&cli)).await;

    if matches!(cli.command, Commands::Transcribe { .. }) && config.api_key.is_none() {
        presenter.error(&AppError::MissingApiKey.to_string());
        return ExitCode::from(EXIT_ERROR);
    }

    let services = match Services::build(&config, &config_store.data_dir()).await {
        Ok(services) => services,
        Err(e) => {
            presenter.error(&e.to_string());
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let code = match cli.command {
        Commands::Transcribe { files, .. } => {
            let language = Some(config.language_or_default().to_string());
            run_transcribe(&services, &mut presenter, files, language).await
        }
        Commands::Status { id } => run_status(&services, &presenter, id).await,
        Commands::List => run_list(&services, &presenter).await,
        Commands::Url { id, ttl } => {
            match services.media.signed_url(id, services.owner, ttl.as_std()).await {
                Ok(url) => {
                    presenter.output(&url);
                    EXIT_SUCCESS
                }
                Err(e) => {
                    presenter.error(&e.to_string());
                    EXIT_ERROR
                }
            }
        }
        Commands::Delete { id } => match services.deletion.delete(id, services.owner).await {
            Ok(()) => {
                presenter.success(&format!("Deleted {}", id));
                EXIT_SUCCESS
            }
            Err(e) => {
                presenter.error(&e.to_string());
                EXIT_ERROR
            }
        },
        Commands::Config { .. } => EXIT_USAGE_ERROR,
    };

    services.queue.shutdown();
    ExitCode::from(code)
}

/// Upload every file, wait for all jobs to settle, print transcripts
async fn run_transcribe(
    services: &Services,
    presenter: &mut Presenter,
    files: Vec<PathBuf>,
    language: Option<String>,
) -> u8 {
    // Subscribe before enqueueing so no change is missed
    let mut changes = services.status.subscribe();
    let mut failed = 0usize;
    let mut jobs: Vec<(String, TranscriptionId)> = Vec::new();

    for path in &files {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                presenter.error(&format!("{}: {}", path.display(), e));
                failed += 1;
                continue;
            }
        };
        match services
            .upload
            .upload(services.owner, &file_name, bytes, language.clone())
            .await
        {
            Ok(receipt) => {
                presenter.info(&format!("Queued {} as {}", file_name, receipt.transcription_id));
                jobs.push((file_name, receipt.transcription_id));
            }
            Err(e) => {
                presenter.error(&format!("{}: {}", path.display(), e));
                failed += 1;
            }
        }
    }

    if jobs.is_empty() {
        return EXIT_ERROR;
    }

    let total = jobs.len();
    let mut remaining: HashSet<TranscriptionId> = jobs.iter().map(|(_, id)| *id).collect();
    let mut settled_failed = 0usize;
    let mut poll = tokio::time::interval(POLL_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let initial = presenter.format_progress(0, 0, total);
    presenter.start_spinner(&initial);
    loop {
        // The queue, not the store, decides when a job is settled:
        // compensation for a failed job finishes before the queue records it.
        for (file_name, id) in &jobs {
            if !remaining.contains(id) {
                continue;
            }
            let Some(status) = services.queue.status_of(*id).filter(|s| s.is_terminal()) else {
                continue;
            };
            remaining.remove(id);
            if status == TranscriptionStatus::Error {
                settled_failed += 1;
            }
            presenter.spinner_println(&format!(
                "{} {}",
                presenter.status_label(status),
                file_name
            ));
        }
        if remaining.is_empty() {
            break;
        }
        presenter.update_spinner(&presenter.format_progress(
            total - remaining.len() - settled_failed,
            settled_failed,
            total,
        ));

        tokio::select! {
            _ = &mut ctrl_c => {
                presenter.spinner_fail("Interrupted");
                warn!(pending = remaining.len(), "Interrupted before all jobs finished");
                return EXIT_ERROR;
            }
            change = changes.recv() => match change {
                Ok(change) if remaining.contains(&change.id) => {
                    debug!(job_id = %change.id, status = %change.status, "Status changed");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Change notifications lagged");
                }
                Err(RecvError::Closed) => {
                    poll.tick().await;
                }
            },
            _ = poll.tick() => {}
        }
    }
    if settled_failed == 0 {
        presenter.spinner_success(&format!("{} transcription(s) done", total));
    } else {
        presenter.spinner_fail(&format!("{} of {} transcription(s) failed", settled_failed, total));
    }

    for (file_name, id) in &jobs {
        match services.status.current(*id).await {
            Ok(record) if record.status == TranscriptionStatus::Completed => {
                if total > 1 {
                    presenter.success(&format!("{} ({})", file_name, id));
                }
                presenter.output(record.content.as_deref().unwrap_or_default());
            }
            Ok(record) => {
                presenter.error(&format!(
                    "{} ({}): transcription ended with status {}",
                    file_name, id, record.status
                ));
                failed += 1;
            }
            Err(e) => {
                presenter.error(&format!("{} ({}): {}", file_name, id, e));
                failed += 1;
            }
        }
    }

    if failed > 0 {
        presenter.warn(&format!("{} of {} file(s) failed", failed, files.len()));
        EXIT_ERROR
    } else {
        EXIT_SUCCESS
    }
}

async fn run_status(services: &Services, presenter: &Presenter, id: TranscriptionId) -> u8 {
    let entry = match services.metadata.find_transcription(id, services.owner).await {
        Ok(Some(entry)) => entry,
        Ok(None) => {
            presenter.error(&format!("Transcription not found: {}", id));
            return EXIT_ERROR;
        }
        Err(e) => {
            presenter.error(&e.to_string());
            return EXIT_ERROR;
        }
    };

    let record = &entry.record;
    presenter.key_value("id", &record.id.to_string());
    presenter.key_value("file", &entry.file.file_name);
    presenter.key_value("status", &presenter.status_label(record.status).to_string());
    presenter.key_value("language", record.language.as_deref().unwrap_or("(auto)"));
    presenter.key_value("created", &record.created_at.to_rfc3339());
    presenter.key_value("updated", &record.updated_at.to_rfc3339());
    if let Some(ref content) = record.content {
        presenter.output("");
        presenter.output(content);
    }
    EXIT_SUCCESS
}

async fn run_list(services: &Services, presenter: &Presenter) -> u8 {
    let entries = match services.metadata.list_transcriptions(services.owner).await {
        Ok(entries) => entries,
        Err(e) => {
            presenter.error(&e.to_string());
            return EXIT_ERROR;
        }
    };

    if entries.is_empty() {
        presenter.info("No transcriptions yet");
        return EXIT_SUCCESS;
    }
    for entry in entries {
        presenter.output(&format!(
            "{}  {:<10}  {}  {}",
            entry.record.id,
            presenter.status_label(entry.record.status),
            entry.record.created_at.format("%Y-%m-%d %H:%M"),
            entry.file.file_name
        ));
    }
    EXIT_SUCCESS
}

/// Config overrides carried by command-line flags
pub fn cli_config(cli: &Cli) -> AppConfig {
    let mut config = AppConfig {
        database_url: cli.database_url.clone(),
        storage_dir: cli
            .storage_dir
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned()),
        ..Default::default()
    };

    if let Commands::Transcribe {
        language,
        concurrency,
        max_retries,
        ..
    } = &cli.command
    {
        config.language = language.clone();
        if concurrency.is_some() || max_retries.is_some() {
            config.queue = Some(QueueSection {
                concurrency: concurrency.map(|c| c as usize),
                max_retries: *max_retries,
                ..Default::default()
            });
        }
    }
    config
}

/// Load and merge configuration from file, env, and CLI
pub async fn load_merged_config<S: ConfigStore>(store: &S, cli_config: AppConfig) -> AppConfig {
    let file_config = match store.load().await {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Ignoring unreadable config file");
            AppConfig::empty()
        }
    };

    AppConfig::defaults()
        .merge(file_config)
        .merge(env_config())
        .merge(cli_config)
}

fn env_config() -> AppConfig {
    AppConfig {
        api_key: env::var("OPENAI_API_KEY").ok().filter(|s| !s.is_empty()),
        owner_id: env::var("SCRIBE_QUEUE_OWNER").ok().filter(|s| !s.is_empty()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn transcribe_flags_become_overrides() {
        let cli = Cli::parse_from([
            "scribe-queue",
            "transcribe",
            "--concurrency",
            "7",
            "-l",
            "fr",
            "a.mp3",
        ]);
        let config = AppConfig::defaults().merge(cli_config(&cli));
        assert_eq!(config.concurrency_or_default(), 7);
        assert_eq!(config.max_retries_or_default(), 2);
        assert_eq!(config.language_or_default(), "fr");
    }

    #[test]
    fn global_flags_become_overrides() {
        let cli = Cli::parse_from([
            "scribe-queue",
            "--database-url",
            "sqlite::memory:",
            "--storage-dir",
            "/tmp/objects",
            "list",
        ]);
        let config = cli_config(&cli);
        assert_eq!(config.database_url.as_deref(), Some("sqlite::memory:"));
        assert_eq!(config.storage_dir.as_deref(), Some("/tmp/objects"));
        assert!(config.queue.is_none());
    }

    #[test]
    fn queue_config_uses_merged_values() {
        let mut config = AppConfig::defaults();
        if let Some(ref mut queue) = config.queue {
            queue.stuck_after = Some("15m".to_string());
            queue.max_retries = Some(4);
        }
        let backoff = Backoff::default();
        let queue = queue_config(&config, backoff);
        assert_eq!(queue.concurrency, 3);
        assert_eq!(queue.retry.max_retries, 4);
        assert_eq!(queue.stuck_after, Some(Duration::from_secs(900)));
    }

    #[tokio::test]
    async fn build_requires_owner() {
        let config = AppConfig {
            database_url: Some("sqlite::memory:".to_string()),
            ..AppConfig::defaults()
        };
        assert!(matches!(
            Services::build(&config, Path::new("/nonexistent")).await,
            Err(AppError::MissingOwner)
        ));
    }
}
