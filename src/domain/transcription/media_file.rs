//! Media file value object

use std::fmt;

use crate::domain::error::MediaValidationError;

/// Maximum accepted upload size (100 MiB)
pub const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Supported media types, keyed by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Mp3,
    Mpeg,
    Mpga,
    M4a,
    Wav,
    Webm,
    Ogg,
    Flac,
    Aac,
    Mp4,
    Mov,
    Mkv,
}

impl MediaType {
    /// Get the MIME type string
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Mp3 | Self::Mpeg | Self::Mpga => "audio/mpeg",
            Self::M4a => "audio/mp4",
            Self::Wav => "audio/wav",
            Self::Webm => "video/webm",
            Self::Ogg => "audio/ogg",
            Self::Flac => "audio/flac",
            Self::Aac => "audio/aac",
            Self::Mp4 => "video/mp4",
            Self::Mov => "video/quicktime",
            Self::Mkv => "video/x-matroska",
        }
    }

    /// Get the canonical file extension
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Mpeg => "mpeg",
            Self::Mpga => "mpga",
            Self::M4a => "m4a",
            Self::Wav => "wav",
            Self::Webm => "webm",
            Self::Ogg => "ogg",
            Self::Flac => "flac",
            Self::Aac => "aac",
            Self::Mp4 => "mp4",
            Self::Mov => "mov",
            Self::Mkv => "mkv",
        }
    }

    /// Infer the media type from a file name's extension
    pub fn from_file_name(name: &str) -> Option<Self> {
        let ext = name.rsplit_once('.')?.1.to_lowercase();
        let media = match ext.as_str() {
            "mp3" => Self::Mp3,
            "mpeg" => Self::Mpeg,
            "mpga" => Self::Mpga,
            "m4a" => Self::M4a,
            "wav" => Self::Wav,
            "webm" => Self::Webm,
            "ogg" => Self::Ogg,
            "flac" => Self::Flac,
            "aac" => Self::Aac,
            "mp4" => Self::Mp4,
            "mov" => Self::Mov,
            "mkv" => Self::Mkv,
            _ => return None,
        };
        Some(media)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Value object holding an uploaded media payload.
/// Owned by exactly one job at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    data: Vec<u8>,
    file_name: String,
    media_type: MediaType,
}

impl MediaFile {
    /// Validate and wrap an uploaded payload
    pub fn new(file_name: impl Into<String>, data: Vec<u8>) -> Result<Self, MediaValidationError> {
        let file_name = file_name.into();
        if data.is_empty() {
            return Err(MediaValidationError::Empty);
        }
        if data.len() > MAX_UPLOAD_BYTES {
            return Err(MediaValidationError::TooLarge {
                size: data.len(),
                limit: MAX_UPLOAD_BYTES,
            });
        }
        let media_type = MediaType::from_file_name(&file_name)
            .ok_or_else(|| MediaValidationError::UnsupportedType(file_name.clone()))?;

        Ok(Self {
            data,
            file_name,
            media_type,
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume and return the raw bytes
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Get human-readable size
    pub fn human_readable_size(&self) -> String {
        let bytes = self.size_bytes();
        if bytes < 1024 {
            format!("{} B", bytes)
        } else if bytes < 1024 * 1024 {
            format!("{:.1} KB", bytes as f64 / 1024.0)
        } else {
            format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
        }
    }
}
