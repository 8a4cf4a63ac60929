//! In-memory object storage

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

use crate::application::ports::{ObjectStorage, StorageError};
use crate::domain::storage::StorageLocator;

#[derive(Default)]
struct Objects {
    blobs: HashMap<String, Vec<u8>>,
    failing_puts: u32,
    failing_deletes: u32,
    delete_calls: u32,
}

/// Object storage held in a map, for tests and embedding.
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<Objects>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` puts fail with a transient I/O error
    pub fn fail_next_puts(&self, count: u32) {
        self.objects.lock().failing_puts = count;
    }

    /// Make the next `count` deletes fail with a transient I/O error
    pub fn fail_next_deletes(&self, count: u32) {
        self.objects.lock().failing_deletes = count;
    }

    pub fn contains(&self, locator: &StorageLocator) -> bool {
        self.objects.lock().blobs.contains_key(locator.as_str())
    }

    pub fn len(&self) -> usize {
        self.objects.lock().blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn delete_calls(&self) -> u32 {
        self.objects.lock().delete_calls
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStore {
    async fn put(&self, locator: &StorageLocator, bytes: &[u8]) -> Result<(), StorageError> {
        let mut objects = self.objects.lock();
        if objects.failing_puts > 0 {
            objects.failing_puts -= 1;
            return Err(StorageError::Io("injected put failure".to_string()));
        }
        objects
            .blobs
            .insert(locator.as_str().to_string(), bytes.to_vec());
        Ok(())
    }

    async fn delete(&self, locator: &StorageLocator) -> Result<(), StorageError> {
        let mut objects = self.objects.lock();
        objects.delete_calls += 1;
        if objects.failing_deletes > 0 {
            objects.failing_deletes -= 1;
            return Err(StorageError::Io("injected delete failure".to_string()));
        }
        objects.blobs.remove(locator.as_str());
        Ok(())
    }

    async fn exists(&self, locator: &StorageLocator) -> Result<bool, StorageError> {
        Ok(self.contains(locator))
    }

    async fn signed_url(
        &self,
        locator: &StorageLocator,
        ttl: Duration,
    ) -> Result<String, StorageError> {
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        Ok(format!("memory://{}?expires={}", locator, expires))
    }
}
