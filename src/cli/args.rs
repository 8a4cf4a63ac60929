//! CLI argument definitions using Clap

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use crate::domain::config::Duration;
use crate::domain::ids::TranscriptionId;

/// ScribeQueue - queued speech-to-text transcription of media files
#[derive(Parser, Debug)]
#[command(name = "scribe-queue")]
#[command(version)]
#[command(about = "Queue media files for speech-to-text transcription with retries and cleanup")]
#[command(long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Database URL (default: SQLite file in the data directory)
    #[arg(long, value_name = "URL", global = true)]
    pub database_url: Option<String>,

    /// Directory for stored media (default: objects/ in the data directory)
    #[arg(long, value_name = "DIR", global = true)]
    pub storage_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload media files, transcribe them and print the transcripts
    Transcribe {
        /// Media files to transcribe
        #[arg(required = true, value_name = "FILES")]
        files: Vec<PathBuf>,

        /// Spoken language hint (e.g., en, de)
        #[arg(short = 'l', long, value_name = "LANG")]
        language: Option<String>,

        /// Maximum jobs transcribed at once
        #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
        concurrency: Option<u64>,

        /// Retries per job after a transient failure
        #[arg(long, value_name = "N")]
        max_retries: Option<u32>,
    },
    /// Show the status of a transcription
    Status {
        /// Transcription id
        id: TranscriptionId,
    },
    /// List your transcriptions
    List,
    /// Print a time-limited URL for a transcription's media
    Url {
        /// Transcription id
        id: TranscriptionId,

        /// Lifetime of the URL (e.g., 30m, 1h)
        #[arg(long, value_name = "TIME", default_value = "1h")]
        ttl: Duration,
    },
    /// Delete a transcription and its media
    Delete {
        /// Transcription id
        id: TranscriptionId,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config action subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Create config file with defaults
    Init,
    /// Set a config value
    Set {
        /// Config key
        key: String,
        /// Config value
        value: String,
    },
    /// Get a config value
    Get {
        /// Config key
        key: String,
    },
    /// List all config values
    List,
    /// Show config file path
    Path,
}

/// Valid config keys
pub const VALID_CONFIG_KEYS: &[&str] = &[
    "api_key",
    "api_base_url",
    "model",
    "language",
    "owner_id",
    "storage_dir",
    "database_url",
    "transcribe_timeout",
    "storage_timeout",
    "store_timeout",
    "queue.concurrency",
    "queue.max_retries",
    "queue.tick_interval",
    "queue.retry_base_delay",
    "queue.retry_max_delay",
    "queue.stuck_after",
];

/// Check if a config key is valid
pub fn is_valid_config_key(key: &str) -> bool {
    VALID_CONFIG_KEYS.contains(&key)
}
