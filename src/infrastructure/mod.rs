//! Infrastructure layer - Adapter implementations
//!
//! Contains concrete implementations of the port interfaces:
//! SQLite and in-memory stores, local and in-memory object storage,
//! the OpenAI speech-to-text client, the XDG config file and logging.

pub mod config;
pub mod logging;
pub mod storage;
pub mod store;
pub mod transcription;

// Re-export adapters
pub use config::XdgConfigStore;
pub use logging::init_logging;
pub use storage::{InMemoryObjectStore, LocalObjectStore};
pub use store::{InMemoryStore, SqliteStore};
pub use transcription::{OpenAiTranscriber, RateLimiter};
