//! Config command handler

use crate::application::ports::ConfigStore;
use crate::domain::config::{AppConfig, Duration, QueueSection};
use crate::domain::error::ConfigError;
use crate::domain::ids::OwnerId;

use super::args::{is_valid_config_key, ConfigAction, VALID_CONFIG_KEYS};
use super::presenter::Presenter;

const NOT_SET: &str = "(not set)";

/// Handle config subcommand
pub async fn handle_config_command<S: ConfigStore>(
    action: ConfigAction,
    store: &S,
    presenter: &Presenter,
) -> Result<(), ConfigError> {
    match action {
        ConfigAction::Init => handle_init(store, presenter).await,
        ConfigAction::Set { key, value } => handle_set(store, presenter, &key, &value).await,
        ConfigAction::Get { key } => handle_get(store, presenter, &key).await,
        ConfigAction::List => handle_list(store, presenter).await,
        ConfigAction::Path => handle_path(store, presenter),
    }
}

async fn handle_init<S: ConfigStore>(store: &S, presenter: &Presenter) -> Result<(), ConfigError> {
    let config = store.init().await?;
    presenter.success(&format!(
        "Config file created at: {}",
        store.path().display()
    ));
    if let Some(owner) = config.owner_id {
        presenter.key_value("owner_id", &owner);
    }
    Ok(())
}

async fn handle_set<S: ConfigStore>(
    store: &S,
    presenter: &Presenter,
    key: &str,
    value: &str,
) -> Result<(), ConfigError> {
    check_key(key)?;
    let mut config = store.load().await?;
    apply_value(&mut config, key, value)?;
    store.save(&config).await?;

    let shown = if key == "api_key" {
        mask_api_key(value)
    } else {
        value.to_string()
    };
    presenter.success(&format!("{} = {}", key, shown));
    Ok(())
}

async fn handle_get<S: ConfigStore>(
    store: &S,
    presenter: &Presenter,
    key: &str,
) -> Result<(), ConfigError> {
    check_key(key)?;
    let config = store.load().await?;

    match read_value(&config, key) {
        Some(v) => presenter.output(&v),
        None => presenter.output(NOT_SET),
    }
    Ok(())
}

async fn handle_list<S: ConfigStore>(store: &S, presenter: &Presenter) -> Result<(), ConfigError> {
    let config = store.load().await?;
    for key in VALID_CONFIG_KEYS {
        let value = read_value(&config, key).unwrap_or_else(|| NOT_SET.to_string());
        presenter.key_value(key, &value);
    }
    Ok(())
}

fn handle_path<S: ConfigStore>(store: &S, presenter: &Presenter) -> Result<(), ConfigError> {
    presenter.output(&store.path().to_string_lossy());
    Ok(())
}

fn check_key(key: &str) -> Result<(), ConfigError> {
    if is_valid_config_key(key) {
        return Ok(());
    }
    Err(ConfigError::ValidationError {
        key: key.to_string(),
        message: format!("Unknown key. Valid keys: {}", VALID_CONFIG_KEYS.join(", ")),
    })
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        key: key.to_string(),
        message: message.into(),
    }
}

/// Validate `value` for `key` and store it in `config`
fn apply_value(config: &mut AppConfig, key: &str, value: &str) -> Result<(), ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(invalid(key, "Value must not be empty"));
    }
    let text = Some(value.to_string());

    match key {
        "api_key" => config.api_key = text,
        "api_base_url" => {
            if !(value.starts_with("http://") || value.starts_with("https://")) {
                return Err(invalid(key, "Value must be an http:// or https:// URL"));
            }
            config.api_base_url = Some(value.trim_end_matches('/').to_string());
        }
        "model" => config.model = text,
        "language" => config.language = text,
        "owner_id" => {
            let owner: OwnerId = value
                .parse()
                .map_err(|e: uuid::Error| invalid(key, e.to_string()))?;
            if owner.is_nil() {
                return Err(invalid(key, "Owner id must not be the nil UUID"));
            }
            config.owner_id = text;
        }
        "storage_dir" => config.storage_dir = text,
        "database_url" => config.database_url = text,
        "transcribe_timeout" => config.transcribe_timeout = Some(parse_duration(key, value)?),
        "storage_timeout" => config.storage_timeout = Some(parse_duration(key, value)?),
        "store_timeout" => config.store_timeout = Some(parse_duration(key, value)?),
        "queue.concurrency" => {
            let concurrency = value
                .parse::<usize>()
                .ok()
                .filter(|c| *c > 0)
                .ok_or_else(|| invalid(key, "Value must be a positive integer"))?;
            queue_section(config).concurrency = Some(concurrency);
        }
        "queue.max_retries" => {
            let retries = value
                .parse::<u32>()
                .map_err(|_| invalid(key, "Value must be a non-negative integer"))?;
            queue_section(config).max_retries = Some(retries);
        }
        "queue.tick_interval" => {
            queue_section(config).tick_interval = Some(parse_duration(key, value)?)
        }
        "queue.retry_base_delay" => {
            queue_section(config).retry_base_delay = Some(parse_duration(key, value)?)
        }
        "queue.retry_max_delay" => {
            queue_section(config).retry_max_delay = Some(parse_duration(key, value)?)
        }
        "queue.stuck_after" => {
            queue_section(config).stuck_after = Some(parse_duration(key, value)?)
        }
        _ => return Err(invalid(key, "Unknown key")),
    }
    Ok(())
}

fn read_value(config: &AppConfig, key: &str) -> Option<String> {
    let queue = config.queue.as_ref();
    match key {
        "api_key" => config.api_key.as_deref().map(mask_api_key),
        "api_base_url" => config.api_base_url.clone(),
        "model" => config.model.clone(),
        "language" => config.language.clone(),
        "owner_id" => config.owner_id.clone(),
        "storage_dir" => config.storage_dir.clone(),
        "database_url" => config.database_url.clone(),
        "transcribe_timeout" => config.transcribe_timeout.clone(),
        "storage_timeout" => config.storage_timeout.clone(),
        "store_timeout" => config.store_timeout.clone(),
        "queue.concurrency" => queue.and_then(|q| q.concurrency).map(|c| c.to_string()),
        "queue.max_retries" => queue.and_then(|q| q.max_retries).map(|r| r.to_string()),
        "queue.tick_interval" => queue.and_then(|q| q.tick_interval.clone()),
        "queue.retry_base_delay" => queue.and_then(|q| q.retry_base_delay.clone()),
        "queue.retry_max_delay" => queue.and_then(|q| q.retry_max_delay.clone()),
        "queue.stuck_after" => queue.and_then(|q| q.stuck_after.clone()),
        _ => None,
    }
}

fn queue_section(config: &mut AppConfig) -> &mut QueueSection {
    config.queue.get_or_insert_with(QueueSection::default)
}

/// Parse and normalize a duration value
fn parse_duration(key: &str, value: &str) -> Result<String, ConfigError> {
    value
        .parse::<Duration>()
        .map(|d| d.to_string())
        .map_err(|e| invalid(key, e.to_string()))
}

/// Mask API key for display (show first 4 and last 4 chars)
fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    }
}
