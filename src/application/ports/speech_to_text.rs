//! Speech-to-text port interface

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::application::retry::Retryable;
use crate::domain::transcription::MediaFile;

/// Speech-to-text errors, classified by variant
#[derive(Debug, Clone, Error)]
pub enum SpeechError {
    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited,

    #[error("API request failed: {0}")]
    RequestFailed(String),

    #[error("API request timed out")]
    Timeout,

    #[error("API server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("File is too large for transcription: {size} bytes (limit {limit})")]
    FileTooLarge { size: usize, limit: usize },

    #[error("API rejected the request ({status}): {message}")]
    BadRequest { status: u16, message: String },

    #[error("Empty transcription response")]
    EmptyResponse,

    #[error("Failed to parse API response: {0}")]
    ParseError(String),
}

impl Retryable for SpeechError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::RequestFailed(_) | Self::Timeout | Self::ServerError { .. }
        )
    }
}

/// Incremental progress reported by an adapter during one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscriptionProgress {
    /// 0..=100
    pub percent: u8,
}

impl TranscriptionProgress {
    pub fn new(percent: u8) -> Self {
        Self {
            percent: percent.min(100),
        }
    }
}

/// Progress callback
pub type ProgressCallback = Arc<dyn Fn(TranscriptionProgress) + Send + Sync>;

/// Port for speech-to-text transcription
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe a media file to text.
    ///
    /// # Arguments
    /// * `media` - The media file to transcribe
    /// * `language` - Optional language hint (ISO-639-1)
    /// * `on_progress` - Receives incremental progress events
    ///
    /// # Returns
    /// The transcript text or a classified error
    async fn transcribe(
        &self,
        media: &MediaFile,
        language: Option<&str>,
        on_progress: ProgressCallback,
    ) -> Result<String, SpeechError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(SpeechError::RateLimited.is_retryable());
        assert!(SpeechError::Timeout.is_retryable());
        assert!(SpeechError::RequestFailed("reset".into()).is_retryable());
        assert!(SpeechError::ServerError {
            status: 503,
            message: "busy".into()
        }
        .is_retryable());
    }

    #[test]
    fn permanent_errors_are_not_retryable() {
        assert!(!SpeechError::InvalidApiKey.is_retryable());
        assert!(!SpeechError::UnsupportedFormat("txt".into()).is_retryable());
        assert!(!SpeechError::FileTooLarge { size: 2, limit: 1 }.is_retryable());
        assert!(!SpeechError::BadRequest {
            status: 400,
            message: "bad".into()
        }
        .is_retryable());
        assert!(!SpeechError::EmptyResponse.is_retryable());
        assert!(!SpeechError::ParseError("eof".into()).is_retryable());
    }

    #[test]
    fn progress_is_clamped() {
        assert_eq!(TranscriptionProgress::new(250).percent, 100);
    }
}
