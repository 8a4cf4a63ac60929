//! OpenAI Whisper transcriber adapter

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::application::ports::{
    ProgressCallback, SpeechError, SpeechToText, TranscriptionProgress,
};
use crate::domain::transcription::{MediaFile, MediaType};

use super::rate_limiter::RateLimiter;

/// Whisper model to use
pub const DEFAULT_MODEL: &str = "whisper-1";

/// OpenAI API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Upload limit of the transcription endpoint (25 MiB)
pub const MAX_API_FILE_BYTES: usize = 25 * 1024 * 1024;

/// Formats the endpoint accepts
const SUPPORTED_FORMATS: &[MediaType] = &[
    MediaType::Mp3,
    MediaType::Mp4,
    MediaType::Mpeg,
    MediaType::Mpga,
    MediaType::M4a,
    MediaType::Wav,
    MediaType::Webm,
];

// Response types for the transcription endpoint

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// OpenAI transcription client
pub struct OpenAiTranscriber {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
    limiter: RateLimiter,
}

impl OpenAiTranscriber {
    /// Create a new transcriber with the given API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
            limiter: RateLimiter::default(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point at another server (proxies, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    /// Build the API URL
    fn endpoint(&self) -> String {
        format!(
            "{}/v1/audio/transcriptions",
            self.base_url.trim_end_matches('/')
        )
    }

    /// Reject input the API is known to refuse
    fn validate(media: &MediaFile) -> Result<(), SpeechError> {
        if !SUPPORTED_FORMATS.contains(&media.media_type()) {
            return Err(SpeechError::UnsupportedFormat(
                media.media_type().extension().to_string(),
            ));
        }
        if media.size_bytes() > MAX_API_FILE_BYTES {
            return Err(SpeechError::FileTooLarge {
                size: media.size_bytes(),
                limit: MAX_API_FILE_BYTES,
            });
        }
        Ok(())
    }

    /// Map an unsuccessful HTTP status to a classified error
    fn classify_status(status: StatusCode, body: &str) -> SpeechError {
        let message = serde_json::from_str::<ErrorEnvelope>(body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| body.trim().to_string());

        match status {
            StatusCode::UNAUTHORIZED => SpeechError::InvalidApiKey,
            StatusCode::TOO_MANY_REQUESTS => SpeechError::RateLimited,
            StatusCode::REQUEST_TIMEOUT => SpeechError::Timeout,
            s if s.is_server_error() => SpeechError::ServerError {
                status: s.as_u16(),
                message,
            },
            s => SpeechError::BadRequest {
                status: s.as_u16(),
                message,
            },
        }
    }

    fn transport_error(err: reqwest::Error) -> SpeechError {
        if err.is_timeout() {
            SpeechError::Timeout
        } else {
            SpeechError::RequestFailed(err.to_string())
        }
    }

    fn build_form(&self, media: &MediaFile, language: Option<&str>) -> Result<Form, SpeechError> {
        let part = Part::bytes(media.data().to_vec())
            .file_name(media.file_name().to_string())
            .mime_str(media.media_type().as_str())
            .map_err(|e| SpeechError::RequestFailed(e.to_string()))?;

        let mut form = Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "json");
        if let Some(language) = language.map(str::trim).filter(|l| !l.is_empty()) {
            form = form.text("language", language.to_string());
        }
        Ok(form)
    }
}

#[async_trait]
impl SpeechToText for OpenAiTranscriber {
    async fn transcribe(
        &self,
        media: &MediaFile,
        language: Option<&str>,
        on_progress: ProgressCallback,
    ) -> Result<String, SpeechError> {
        Self::validate(media)?;
        let form = self.build_form(media, language)?;

        self.limiter.acquire().await;
        on_progress(TranscriptionProgress::new(0));
        debug!(file = media.file_name(), model = %self.model, "Sending transcription request");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(Self::transport_error)?;
        on_progress(TranscriptionProgress::new(50));

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, &body));
        }

        let body: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| SpeechError::ParseError(e.to_string()))?;

        let text = body
            .text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(SpeechError::EmptyResponse)?;

        on_progress(TranscriptionProgress::new(100));
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_base_url() {
        let transcriber = OpenAiTranscriber::new("key").with_base_url("http://localhost:9000/");
        assert_eq!(
            transcriber.endpoint(),
            "http://localhost:9000/v1/audio/transcriptions"
        );
    }

    #[test]
    fn default_endpoint() {
        let transcriber = OpenAiTranscriber::new("key");
        assert_eq!(
            transcriber.endpoint(),
            "https://api.openai.com/v1/audio/transcriptions"
        );
    }

    #[test]
    fn rejects_unsupported_format() {
        let media = MediaFile::new("song.flac", vec![1, 2, 3]).unwrap();
        assert!(matches!(
            OpenAiTranscriber::validate(&media),
            Err(SpeechError::UnsupportedFormat(ext)) if ext == "flac"
        ));
    }

    #[test]
    fn rejects_oversized_file() {
        let media = MediaFile::new("talk.mp3", vec![0; MAX_API_FILE_BYTES + 1]).unwrap();
        assert!(matches!(
            OpenAiTranscriber::validate(&media),
            Err(SpeechError::FileTooLarge { .. })
        ));
    }

    #[test]
    fn classify_status_codes() {
        assert!(matches!(
            OpenAiTranscriber::classify_status(StatusCode::UNAUTHORIZED, ""),
            SpeechError::InvalidApiKey
        ));
        assert!(matches!(
            OpenAiTranscriber::classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            SpeechError::RateLimited
        ));
        assert!(matches!(
            OpenAiTranscriber::classify_status(StatusCode::BAD_GATEWAY, "upstream"),
            SpeechError::ServerError { status: 502, .. }
        ));
    }

    #[test]
    fn classify_extracts_api_message() {
        let body = r#"{"error":{"message":"Invalid file format.","type":"invalid_request_error"}}"#;
        match OpenAiTranscriber::classify_status(StatusCode::BAD_REQUEST, body) {
            SpeechError::BadRequest { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Invalid file format.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
