//! Application configuration value object

use serde::{Deserialize, Serialize};

use crate::domain::ids::OwnerId;

use super::duration::Duration;

pub const DEFAULT_MODEL: &str = "whisper-1";
pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_CONCURRENCY: usize = 3;
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(10);
pub const DEFAULT_TRANSCRIBE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);

/// Queue tuning section (`[queue]` in the config file).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueSection {
    pub concurrency: Option<usize>,
    pub max_retries: Option<u32>,
    pub tick_interval: Option<String>,
    pub retry_base_delay: Option<String>,
    pub retry_max_delay: Option<String>,
    pub stuck_after: Option<String>,
}

/// Application configuration.
/// All fields are optional to support partial configs and merging.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub api_base_url: Option<String>,
    pub model: Option<String>,
    pub language: Option<String>,
    pub owner_id: Option<String>,
    pub storage_dir: Option<String>,
    pub database_url: Option<String>,
    pub transcribe_timeout: Option<String>,
    pub storage_timeout: Option<String>,
    pub store_timeout: Option<String>,
    pub queue: Option<QueueSection>,
}

impl AppConfig {
    /// Create config with default values
    pub fn defaults() -> Self {
        Self {
            api_key: None,
            api_base_url: Some(DEFAULT_API_BASE_URL.to_string()),
            model: Some(DEFAULT_MODEL.to_string()),
            language: Some(DEFAULT_LANGUAGE.to_string()),
            owner_id: None,
            storage_dir: None,
            database_url: None,
            transcribe_timeout: Some(DEFAULT_TRANSCRIBE_TIMEOUT.to_string()),
            storage_timeout: Some(DEFAULT_STORAGE_TIMEOUT.to_string()),
            store_timeout: Some(DEFAULT_STORE_TIMEOUT.to_string()),
            queue: Some(QueueSection {
                concurrency: Some(DEFAULT_CONCURRENCY),
                max_retries: Some(DEFAULT_MAX_RETRIES),
                tick_interval: Some(DEFAULT_TICK_INTERVAL.to_string()),
                retry_base_delay: Some(DEFAULT_RETRY_BASE_DELAY.to_string()),
                retry_max_delay: Some(DEFAULT_RETRY_MAX_DELAY.to_string()),
                stuck_after: None,
            }),
        }
    }

    /// Create an empty config (all None)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Merge this config with another, where other takes precedence.
    /// Only non-None values from other will override this.
    pub fn merge(self, other: Self) -> Self {
        Self {
            api_key: other.api_key.or(self.api_key),
            api_base_url: other.api_base_url.or(self.api_base_url),
            model: other.model.or(self.model),
            language: other.language.or(self.language),
            owner_id: other.owner_id.or(self.owner_id),
            storage_dir: other.storage_dir.or(self.storage_dir),
            database_url: other.database_url.or(self.database_url),
            transcribe_timeout: other.transcribe_timeout.or(self.transcribe_timeout),
            storage_timeout: other.storage_timeout.or(self.storage_timeout),
            store_timeout: other.store_timeout.or(self.store_timeout),
            queue: Self::merge_queue_section(self.queue, other.queue),
        }
    }

    fn merge_queue_section(
        base: Option<QueueSection>,
        other: Option<QueueSection>,
    ) -> Option<QueueSection> {
        match (base, other) {
            (None, None) => None,
            (Some(b), None) => Some(b),
            (None, Some(o)) => Some(o),
            (Some(b), Some(o)) => Some(QueueSection {
                concurrency: o.concurrency.or(b.concurrency),
                max_retries: o.max_retries.or(b.max_retries),
                tick_interval: o.tick_interval.or(b.tick_interval),
                retry_base_delay: o.retry_base_delay.or(b.retry_base_delay),
                retry_max_delay: o.retry_max_delay.or(b.retry_max_delay),
                stuck_after: o.stuck_after.or(b.stuck_after),
            }),
        }
    }

    fn parse_duration(value: Option<&String>, default: Duration) -> Duration {
        value.and_then(|s| s.parse().ok()).unwrap_or(default)
    }

    fn queue_field<T>(&self, f: impl FnOnce(&QueueSection) -> Option<T>) -> Option<T> {
        self.queue.as_ref().and_then(f)
    }

    /// Get the API base URL, or the OpenAI endpoint if not set
    pub fn api_base_url_or_default(&self) -> &str {
        self.api_base_url.as_deref().unwrap_or(DEFAULT_API_BASE_URL)
    }

    /// Get the model name, or "whisper-1" if not set
    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    /// Get the language hint, or "en" if not set
    pub fn language_or_default(&self) -> &str {
        self.language.as_deref().unwrap_or(DEFAULT_LANGUAGE)
    }

    /// Get the owner id if set and valid
    pub fn owner(&self) -> Option<OwnerId> {
        self.owner_id
            .as_deref()
            .and_then(|s| s.parse().ok())
            .filter(|id: &OwnerId| !id.is_nil())
    }

    pub fn concurrency_or_default(&self) -> usize {
        self.queue_field(|q| q.concurrency)
            .filter(|c| *c > 0)
            .unwrap_or(DEFAULT_CONCURRENCY)
    }

    pub fn max_retries_or_default(&self) -> u32 {
        self.queue_field(|q| q.max_retries)
            .unwrap_or(DEFAULT_MAX_RETRIES)
    }

    pub fn tick_interval_or_default(&self) -> Duration {
        Self::parse_duration(
            self.queue.as_ref().and_then(|q| q.tick_interval.as_ref()),
            DEFAULT_TICK_INTERVAL,
        )
    }

    pub fn retry_base_delay_or_default(&self) -> Duration {
        Self::parse_duration(
            self.queue.as_ref().and_then(|q| q.retry_base_delay.as_ref()),
            DEFAULT_RETRY_BASE_DELAY,
        )
    }

    pub fn retry_max_delay_or_default(&self) -> Duration {
        Self::parse_duration(
            self.queue.as_ref().and_then(|q| q.retry_max_delay.as_ref()),
            DEFAULT_RETRY_MAX_DELAY,
        )
    }

    /// Threshold of the supervisory sweep; `None` disables it
    pub fn stuck_after(&self) -> Option<Duration> {
        self.queue
            .as_ref()
            .and_then(|q| q.stuck_after.as_ref())
            .and_then(|s| s.parse().ok())
    }

    pub fn transcribe_timeout_or_default(&self) -> Duration {
        Self::parse_duration(self.transcribe_timeout.as_ref(), DEFAULT_TRANSCRIBE_TIMEOUT)
    }

    pub fn storage_timeout_or_default(&self) -> Duration {
        Self::parse_duration(self.storage_timeout.as_ref(), DEFAULT_STORAGE_TIMEOUT)
    }

    pub fn store_timeout_or_default(&self) -> Duration {
        Self::parse_duration(self.store_timeout.as_ref(), DEFAULT_STORE_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_expected_values() {
        let config = AppConfig::defaults();
        assert!(config.api_key.is_none());
        assert_eq!(config.model_or_default(), "whisper-1");
        assert_eq!(config.language_or_default(), "en");
        assert_eq!(config.concurrency_or_default(), 3);
        assert_eq!(config.max_retries_or_default(), 2);
        assert_eq!(config.tick_interval_or_default().as_secs(), 5);
        assert_eq!(config.storage_timeout_or_default().as_secs(), 10);
        assert!(config.stuck_after().is_none());
    }

    #[test]
    fn empty_has_all_none() {
        let config = AppConfig::empty();
        assert!(config.api_key.is_none());
        assert!(config.owner_id.is_none());
        assert!(config.queue.is_none());
    }

    #[test]
    fn empty_falls_back_to_defaults() {
        let config = AppConfig::empty();
        assert_eq!(config.concurrency_or_default(), DEFAULT_CONCURRENCY);
        assert_eq!(config.retry_base_delay_or_default(), DEFAULT_RETRY_BASE_DELAY);
        assert_eq!(config.api_base_url_or_default(), DEFAULT_API_BASE_URL);
    }

    #[test]
    fn merge_other_takes_precedence() {
        let base = AppConfig {
            api_key: Some("base_key".to_string()),
            language: Some("en".to_string()),
            ..Default::default()
        };
        let other = AppConfig {
            api_key: Some("other_key".to_string()),
            language: None,
            ..Default::default()
        };

        let merged = base.merge(other);
        assert_eq!(merged.api_key, Some("other_key".to_string()));
        assert_eq!(merged.language, Some("en".to_string()));
    }

    #[test]
    fn merge_queue_sections_field_by_field() {
        let base = AppConfig {
            queue: Some(QueueSection {
                concurrency: Some(3),
                max_retries: Some(2),
                ..Default::default()
            }),
            ..Default::default()
        };
        let other = AppConfig {
            queue: Some(QueueSection {
                concurrency: Some(8),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = base.merge(other);
        assert_eq!(merged.concurrency_or_default(), 8);
        assert_eq!(merged.max_retries_or_default(), 2);
    }

    #[test]
    fn invalid_durations_use_defaults() {
        let config = AppConfig {
            store_timeout: Some("soon".to_string()),
            queue: Some(QueueSection {
                tick_interval: Some("never".to_string()),
                stuck_after: Some("bogus".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(config.store_timeout_or_default(), DEFAULT_STORE_TIMEOUT);
        assert_eq!(config.tick_interval_or_default(), DEFAULT_TICK_INTERVAL);
        assert!(config.stuck_after().is_none());
    }

    #[test]
    fn zero_concurrency_is_ignored() {
        let config = AppConfig {
            queue: Some(QueueSection {
                concurrency: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(config.concurrency_or_default(), DEFAULT_CONCURRENCY);
    }

    #[test]
    fn owner_parses_uuid() {
        let owner = OwnerId::new();
        let config = AppConfig {
            owner_id: Some(owner.to_string()),
            ..Default::default()
        };
        assert_eq!(config.owner(), Some(owner));

        let bad = AppConfig {
            owner_id: Some("someone".to_string()),
            ..Default::default()
        };
        assert!(bad.owner().is_none());
    }

    #[test]
    fn stuck_after_parses_when_set() {
        let config = AppConfig {
            queue: Some(QueueSection {
                stuck_after: Some("30m".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(config.stuck_after().map(|d| d.as_secs()), Some(1800));
    }
}
