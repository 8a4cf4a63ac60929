//! Storage locator value object

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::domain::error::InvalidLocatorError;
use crate::domain::ids::OwnerId;

/// Root segment every upload lives under
pub const UPLOAD_ROOT: &str = "uploads";

/// Validated object-storage key of the form `uploads/<owner>/<file>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageLocator(String);

impl StorageLocator {
    /// Generate a unique locator for a new upload.
    /// Format: `uploads/<owner>/<unix-millis>-<8 random chars>.<ext>`
    pub fn generate(owner: OwnerId, file_name: &str) -> Self {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();
        let ext = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or_else(|| "bin".to_string());

        Self(format!(
            "{}/{}/{}-{}.{}",
            UPLOAD_ROOT,
            owner,
            Utc::now().timestamp_millis(),
            suffix,
            ext
        ))
    }

    /// Parse and normalize a raw path
    pub fn parse(raw: &str) -> Result<Self, InvalidLocatorError> {
        let clean = raw.trim().trim_matches('/');
        if clean.is_empty() {
            return Err(InvalidLocatorError::Empty);
        }

        let segments: Vec<&str> = clean.split('/').collect();
        if segments.len() < 3 {
            return Err(InvalidLocatorError::TooShort(clean.to_string()));
        }
        if segments[0] != UPLOAD_ROOT {
            return Err(InvalidLocatorError::WrongRoot(clean.to_string()));
        }
        if let Some(bad) = segments.iter().find(|s| !is_valid_segment(s)) {
            return Err(InvalidLocatorError::InvalidSegment(bad.to_string()));
        }

        Ok(Self(clean.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The owner segment of the path
    pub fn owner_segment(&self) -> &str {
        self.0.split('/').nth(1).unwrap_or_default()
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

impl fmt::Display for StorageLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StorageLocator {
    type Err = InvalidLocatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for StorageLocator {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
