//! Filesystem object storage adapter

use async_trait::async_trait;
use chrono::Utc;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::debug;

use crate::application::ports::{ObjectStorage, StorageError};
use crate::domain::storage::StorageLocator;

const KEY_FILE: &str = ".signing-key";

fn io_error(err: std::io::Error, locator: &str) -> StorageError {
    match err.kind() {
        ErrorKind::NotFound => StorageError::NotFound(locator.to_string()),
        _ => StorageError::Io(format!("{locator}: {err}")),
    }
}

/// Stores objects as files below a root directory.
///
/// Signed URLs are `file://` URLs carrying an expiry and a SHA-256
/// signature keyed by a per-store secret kept in the root directory.
pub struct LocalObjectStore {
    root: PathBuf,
    secret: Vec<u8>,
}

impl LocalObjectStore {
    /// Open the store at `root`, creating it and its signing key if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| io_error(e, &root.to_string_lossy()))?;

        let key_path = root.join(KEY_FILE);
        let secret = match fs::read_to_string(&key_path).await {
            Ok(existing) => hex::decode(existing.trim())
                .map_err(|e| StorageError::Io(format!("corrupt signing key: {e}")))?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let mut secret = vec![0u8; 32];
                rand::thread_rng().fill_bytes(&mut secret);
                fs::write(&key_path, hex::encode(&secret))
                    .await
                    .map_err(|e| io_error(e, KEY_FILE))?;
                debug!(path = %key_path.display(), "Created signing key");
                secret
            }
            Err(e) => return Err(io_error(e, KEY_FILE)),
        };

        Ok(Self { root, secret })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, locator: &StorageLocator) -> PathBuf {
        locator
            .as_str()
            .split('/')
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    fn signature(&self, locator: &StorageLocator, expires: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.secret);
        hasher.update(locator.as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(expires.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Check a signature produced by `signed_url` against the current time.
    pub fn verify(&self, locator: &StorageLocator, expires: i64, signature: &str) -> bool {
        expires >= Utc::now().timestamp() && self.signature(locator, expires) == signature
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStore {
    async fn put(&self, locator: &StorageLocator, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.path_of(locator);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(e, locator.as_str()))?;
        }
        // Write then rename so readers never see a partial object
        let tmp = path.with_extension("part");
        fs::write(&tmp, bytes)
            .await
            .map_err(|e| io_error(e, locator.as_str()))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error(e, locator.as_str()))?;
        debug!(storage_path = %locator, bytes = bytes.len(), "Object stored");
        Ok(())
    }

    async fn delete(&self, locator: &StorageLocator) -> Result<(), StorageError> {
        match fs::remove_file(self.path_of(locator)).await {
            Ok(()) => {
                debug!(storage_path = %locator, "Object deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(e, locator.as_str())),
        }
    }

    async fn exists(&self, locator: &StorageLocator) -> Result<bool, StorageError> {
        fs::try_exists(self.path_of(locator))
            .await
            .map_err(|e| io_error(e, locator.as_str()))
    }

    async fn signed_url(
        &self,
        locator: &StorageLocator,
        ttl: Duration,
    ) -> Result<String, StorageError> {
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        let path = self.path_of(locator);
        Ok(format!(
            "file://{}?expires={}&signature={}",
            path.display(),
            expires,
            self.signature(locator, expires)
        ))
    }
}
