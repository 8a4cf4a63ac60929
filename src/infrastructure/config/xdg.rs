//! XDG directories for the config file and local data

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::application::ports::ConfigStore;
use crate::domain::config::AppConfig;
use crate::domain::error::ConfigError;
use crate::domain::ids::OwnerId;

const APP_DIR: &str = "scribe-queue";
const CONFIG_FILE: &str = "config.toml";

/// Config store rooted in the user's XDG config and data directories
pub struct XdgConfigStore {
    config_file: PathBuf,
    data_dir: PathBuf,
}

impl XdgConfigStore {
    /// `$XDG_CONFIG_HOME/scribe-queue/config.toml` and `$XDG_DATA_HOME/scribe-queue`
    pub fn new() -> Self {
        let config_root = dirs::config_dir().unwrap_or_else(|| PathBuf::from("~/.config"));
        let data_root = dirs::data_dir().unwrap_or_else(|| PathBuf::from("~/.local/share"));
        Self {
            config_file: config_root.join(APP_DIR).join(CONFIG_FILE),
            data_dir: data_root.join(APP_DIR),
        }
    }

    /// Explicit locations, for tests and relocated installs
    pub fn with_paths(config_file: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_file: config_file.into(),
            data_dir: data_dir.into(),
        }
    }

    pub fn exists(&self) -> bool {
        self.config_file.is_file()
    }

    fn decode(content: &str) -> Result<AppConfig, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    fn encode(config: &AppConfig) -> Result<String, ConfigError> {
        toml::to_string_pretty(config).map_err(|e| ConfigError::WriteError(e.to_string()))
    }

    /// Write through a sibling temp file and rename over the target
    async fn write_atomically(path: &Path, content: &str) -> Result<(), ConfigError> {
        let write_err = |e: std::io::Error| ConfigError::WriteError(e.to_string());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let staging = path.with_extension("toml.tmp");
        fs::write(&staging, content).await.map_err(write_err)?;
        if let Err(e) = fs::rename(&staging, path).await {
            let _ = fs::remove_file(&staging).await;
            return Err(write_err(e));
        }
        Ok(())
    }
}

impl Default for XdgConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigStore for XdgConfigStore {
    async fn load(&self) -> Result<AppConfig, ConfigError> {
        let content = match fs::read_to_string(&self.config_file).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.config_file.display(), "No config file, using defaults");
                return Ok(AppConfig::empty());
            }
            Err(e) => return Err(ConfigError::ReadError(e.to_string())),
        };
        Self::decode(&content)
    }

    async fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        let content = Self::encode(config)?;
        Self::write_atomically(&self.config_file, &content).await?;
        debug!(path = %self.config_file.display(), "Config saved");
        Ok(())
    }

    fn path(&self) -> PathBuf {
        self.config_file.clone()
    }

    fn data_dir(&self) -> PathBuf {
        self.data_dir.clone()
    }

    async fn init(&self) -> Result<AppConfig, ConfigError> {
        if self.exists() {
            return Err(ConfigError::AlreadyExists(
                self.config_file.display().to_string(),
            ));
        }

        let config = AppConfig {
            owner_id: Some(OwnerId::new().to_string()),
            ..AppConfig::defaults()
        };
        self.save(&config).await?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &Path) -> XdgConfigStore {
        XdgConfigStore::with_paths(dir.join("conf/config.toml"), dir.join("data"))
    }

    #[test]
    fn default_locations_are_namespaced() {
        let store = XdgConfigStore::new();
        let config = store.path();
        assert!(config.ends_with("scribe-queue/config.toml"));
        assert!(store.data_dir().ends_with("scribe-queue"));
    }

    #[test]
    fn decode_reads_queue_table() {
        let content = r#"
api_key = "test-key"
language = "de"
store_timeout = "5s"

[queue]
concurrency = 5
max_retries = 1
stuck_after = "30m"
"#;

        let config = XdgConfigStore::decode(content).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("test-key"));
        assert_eq!(config.language.as_deref(), Some("de"));
        assert_eq!(config.store_timeout_or_default().as_secs(), 5);
        assert_eq!(config.concurrency_or_default(), 5);
        assert_eq!(config.max_retries_or_default(), 1);
        assert_eq!(config.stuck_after().map(|d| d.as_secs()), Some(1800));
    }

    #[test]
    fn decode_rejects_malformed_toml() {
        let result = XdgConfigStore::decode("[queue\nconcurrency = ");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[tokio::test]
    async fn init_writes_owner_id_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let config = store.init().await.unwrap();
        assert!(config.owner().is_some());
        assert!(store.exists());

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.owner_id, config.owner_id);
        assert_eq!(loaded.concurrency_or_default(), config.concurrency_or_default());

        assert!(matches!(store.init().await, Err(ConfigError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn save_replaces_without_leaving_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.init().await.unwrap();

        let mut config = store.load().await.unwrap();
        config.model = Some("whisper-large".to_string());
        store.save(&config).await.unwrap();

        assert_eq!(
            store.load().await.unwrap().model.as_deref(),
            Some("whisper-large")
        );
        assert!(!store.path().with_extension("toml.tmp").exists());
    }

    #[tokio::test]
    async fn load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = store_in(dir.path()).load().await.unwrap();
        assert!(config.api_key.is_none());
        assert!(config.queue.is_none());
    }
}
