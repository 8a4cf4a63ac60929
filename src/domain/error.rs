//! Domain error types

use thiserror::Error;

/// Error when parsing a duration string
#[derive(Debug, Clone, Error)]
#[error("Invalid duration format: \"{input}\". Expected format: <number><unit> with units ms, s, m, h (e.g., 500ms, 30s, 2m30s, 1h)")]
pub struct DurationParseError {
    pub input: String,
}

/// Error when a status string is not one of the four known values
#[derive(Debug, Clone, Error)]
#[error("Invalid status: \"{input}\". Valid statuses are: pending, processing, completed, error")]
pub struct InvalidStatusError {
    pub input: String,
}

/// Error when a storage path does not follow `uploads/<owner>/<file>`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidLocatorError {
    #[error("Storage path is required")]
    Empty,

    #[error("Invalid storage path \"{0}\": must contain uploads/<owner>/<file>")]
    TooShort(String),

    #[error("Storage path \"{0}\" must start with \"uploads\"")]
    WrongRoot(String),

    #[error("Invalid characters in storage path segment \"{0}\"")]
    InvalidSegment(String),
}

/// Error when an uploaded media file is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaValidationError {
    #[error("File is empty")]
    Empty,

    #[error("File size {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error("Unsupported file type: \"{0}\". Please upload an audio or video file.")]
    UnsupportedType(String),
}

/// Error when a status update would break the record invariants
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidStatusUpdate {
    #[error("Completed status requires non-empty content")]
    MissingContent,

    #[error("Content is only allowed with completed status, got {0}")]
    UnexpectedContent(String),
}

/// Error when configuration fails
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Failed to parse config file: {0}")]
    ParseError(String),

    #[error("Failed to write config file: {0}")]
    WriteError(String),

    #[error("Invalid config value for '{key}': {message}")]
    ValidationError { key: String, message: String },

    #[error("Config file already exists at: {0}")]
    AlreadyExists(String),
}
