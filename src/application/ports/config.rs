//! Configuration port interface

use async_trait::async_trait;
use std::path::PathBuf;

use crate::domain::config::AppConfig;
use crate::domain::error::ConfigError;

/// Where the persisted config lives, plus the local data directory the
/// CLI falls back to for its database and stored media.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Read the persisted config. A missing file yields an empty config.
    async fn load(&self) -> Result<AppConfig, ConfigError>;

    /// Replace the persisted config. The previous file is never left half-written.
    async fn save(&self, config: &AppConfig) -> Result<(), ConfigError>;

    fn path(&self) -> PathBuf;

    /// Directory holding the default database and object store
    fn data_dir(&self) -> PathBuf;

    /// Create the config file with defaults and a freshly generated owner id.
    ///
    /// # Errors
    /// `ConfigError::AlreadyExists` if a config file is already present
    async fn init(&self) -> Result<AppConfig, ConfigError>;
}
