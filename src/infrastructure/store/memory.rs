//! In-memory status and metadata store

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::broadcast;

use crate::application::ports::{
    MetadataStore, NewTranscription, StatusStore, StoreError, StoredFile, TranscriptionEntry,
};
use crate::domain::ids::{FileId, OwnerId, TranscriptionId};
use crate::domain::storage::StorageLocator;
use crate::domain::transcription::{
    RecordChange, StatusUpdate, TranscriptionRecord, TranscriptionStatus,
};

use super::CHANGE_CHANNEL_CAPACITY;

#[derive(Default)]
struct Tables {
    files: HashMap<FileId, StoredFile>,
    records: HashMap<TranscriptionId, TranscriptionRecord>,
    history: HashMap<TranscriptionId, Vec<TranscriptionStatus>>,
    failing_writes: u32,
}

/// Store backed by hash maps, for tests and embedding.
///
/// Keeps the full status history of every record and can be told to fail
/// upcoming writes.
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    changes: broadcast::Sender<RecordChange>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            tables: Mutex::new(Tables::default()),
            changes,
        }
    }

    /// Make the next `count` calls to `write` fail with `Unavailable`
    pub fn fail_next_writes(&self, count: u32) {
        self.tables.lock().failing_writes = count;
    }

    /// Every status written through `write`, oldest first
    pub fn history(&self, id: TranscriptionId) -> Vec<TranscriptionStatus> {
        self.tables
            .lock()
            .history
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn file(&self, id: FileId) -> Option<StoredFile> {
        self.tables.lock().files.get(&id).cloned()
    }

    pub fn record_count(&self) -> usize {
        self.tables.lock().records.len()
    }

    fn notify(&self, record: &TranscriptionRecord) {
        // No receivers is fine
        let _ = self.changes.send(RecordChange {
            id: record.id,
            owner_id: record.owner_id,
            status: record.status,
        });
    }

    fn entry(tables: &Tables, record: &TranscriptionRecord) -> Option<TranscriptionEntry> {
        tables.files.get(&record.file_id).map(|file| TranscriptionEntry {
            record: record.clone(),
            file: file.clone(),
        })
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatusStore for InMemoryStore {
    async fn read(&self, id: TranscriptionId) -> Result<TranscriptionRecord, StoreError> {
        self.tables
            .lock()
            .records
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn write(&self, update: &StatusUpdate) -> Result<(), StoreError> {
        let id = update.transcription_id();
        let record = {
            let mut tables = self.tables.lock();
            if tables.failing_writes > 0 {
                tables.failing_writes -= 1;
                return Err(StoreError::Unavailable("injected write failure".to_string()));
            }
            let record = tables
                .records
                .get_mut(&id)
                .filter(|r| r.file_id == update.file_id())
                .ok_or(StoreError::NotFound(id))?;
            if record.status.is_terminal() && !update.status().is_terminal() {
                return Ok(());
            }
            record.apply(update);
            let record = record.clone();
            tables.history.entry(id).or_default().push(update.status());
            record
        };
        self.notify(&record);
        Ok(())
    }

    async fn write_progress(
        &self,
        id: TranscriptionId,
        file_id: FileId,
    ) -> Result<bool, StoreError> {
        let record = {
            let mut tables = self.tables.lock();
            let record = tables
                .records
                .get_mut(&id)
                .filter(|r| r.file_id == file_id)
                .ok_or(StoreError::NotFound(id))?;
            if record.status.is_terminal() {
                return Ok(false);
            }
            record.status = TranscriptionStatus::Processing;
            record.updated_at = Utc::now();
            record.clone()
        };
        self.notify(&record);
        Ok(true)
    }

    fn subscribe(&self) -> broadcast::Receiver<RecordChange> {
        self.changes.subscribe()
    }
}

#[async_trait]
impl MetadataStore for InMemoryStore {
    async fn create_transcription(
        &self,
        new: &NewTranscription,
    ) -> Result<TranscriptionRecord, StoreError> {
        let mut tables = self.tables.lock();
        if tables.files.contains_key(&new.file_id)
            || tables.records.values().any(|r| r.file_id == new.file_id)
        {
            return Err(StoreError::Constraint(format!(
                "file {} already has a transcription",
                new.file_id
            )));
        }
        if tables.records.contains_key(&new.transcription_id) {
            return Err(StoreError::Constraint(format!(
                "transcription {} already exists",
                new.transcription_id
            )));
        }
        if tables
            .files
            .values()
            .any(|f| f.storage_locator == new.storage_locator)
        {
            return Err(StoreError::Constraint(format!(
                "storage path {} already in use",
                new.storage_locator
            )));
        }

        let record = TranscriptionRecord::pending(
            new.transcription_id,
            new.file_id,
            new.owner_id,
            new.language.clone(),
        );
        tables.files.insert(
            new.file_id,
            StoredFile {
                id: new.file_id,
                owner_id: new.owner_id,
                file_name: new.file_name.clone(),
                mime_type: new.mime_type.clone(),
                size_bytes: new.size_bytes,
                storage_locator: new.storage_locator.clone(),
                deletable: false,
                created_at: record.created_at,
            },
        );
        tables.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_transcription(
        &self,
        id: TranscriptionId,
        owner: OwnerId,
    ) -> Result<Option<TranscriptionEntry>, StoreError> {
        let tables = self.tables.lock();
        Ok(tables
            .records
            .get(&id)
            .filter(|r| r.owner_id == owner)
            .and_then(|r| Self::entry(&tables, r)))
    }

    async fn list_transcriptions(
        &self,
        owner: OwnerId,
    ) -> Result<Vec<TranscriptionEntry>, StoreError> {
        let tables = self.tables.lock();
        let mut entries: Vec<TranscriptionEntry> = tables
            .records
            .values()
            .filter(|r| r.owner_id == owner)
            .filter_map(|r| Self::entry(&tables, r))
            .collect();
        entries.sort_by(|a, b| b.record.created_at.cmp(&a.record.created_at));
        Ok(entries)
    }

    async fn mark_file_deletable(
        &self,
        owner: OwnerId,
        locator: &StorageLocator,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock();
        match tables
            .files
            .values_mut()
            .find(|f| f.owner_id == owner && &f.storage_locator == locator)
        {
            Some(file) => {
                file.deletable = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn purge_file(
        &self,
        owner: OwnerId,
        locator: &StorageLocator,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock();
        let file_id = tables
            .files
            .values()
            .find(|f| f.owner_id == owner && &f.storage_locator == locator)
            .map(|f| f.id);
        let Some(file_id) = file_id else {
            return Ok(false);
        };
        tables.files.remove(&file_id);
        tables.records.retain(|_, r| r.file_id != file_id);
        Ok(true)
    }

    async fn delete_transcription(
        &self,
        id: TranscriptionId,
        owner: OwnerId,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock();
        let owned = tables.records.get(&id).is_some_and(|r| r.owner_id == owner);
        if !owned {
            return Ok(false);
        }
        if let Some(record) = tables.records.remove(&id) {
            tables.files.remove(&record.file_id);
        }
        tables.history.remove(&id);
        Ok(true)
    }
}
