//! SqliteStore against an in-memory database

use scribe_queue::application::ports::{MetadataStore, NewTranscription, StatusStore, StoreError};
use scribe_queue::domain::ids::{FileId, OwnerId, TranscriptionId};
use scribe_queue::domain::storage::StorageLocator;
use scribe_queue::domain::transcription::{StatusUpdate, TranscriptionStatus};
use scribe_queue::infrastructure::SqliteStore;

async fn store() -> SqliteStore {
    SqliteStore::in_memory().await.expect("in-memory database")
}

fn new_transcription(owner: OwnerId, file_name: &str) -> NewTranscription {
    NewTranscription {
        transcription_id: TranscriptionId::new(),
        file_id: FileId::new(),
        owner_id: owner,
        file_name: file_name.to_string(),
        mime_type: "audio/mpeg".to_string(),
        size_bytes: 1024,
        storage_locator: StorageLocator::generate(owner, file_name),
        language: Some("en".to_string()),
    }
}

fn update(new: &NewTranscription, status: TranscriptionStatus, content: Option<&str>) -> StatusUpdate {
    StatusUpdate::new(
        new.transcription_id,
        new.file_id,
        status,
        content.map(str::to_string),
    )
    .unwrap()
}

#[tokio::test]
async fn create_and_find_round_trip() {
    let store = store().await;
    let owner = OwnerId::new();
    let new = new_transcription(owner, "talk.mp3");

    let created = store.create_transcription(&new).await.unwrap();
    assert_eq!(created.status, TranscriptionStatus::Pending);
    assert!(created.content.is_none());

    let entry = store
        .find_transcription(new.transcription_id, owner)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.record.id, new.transcription_id);
    assert_eq!(entry.record.language.as_deref(), Some("en"));
    assert_eq!(entry.file.id, new.file_id);
    assert_eq!(entry.file.file_name, "talk.mp3");
    assert_eq!(entry.file.size_bytes, 1024);
    assert_eq!(entry.file.storage_locator, new.storage_locator);
    assert!(!entry.file.deletable);

    let read = store.read(new.transcription_id).await.unwrap();
    assert_eq!(read.owner_id, owner);
}

#[tokio::test]
async fn find_is_scoped_to_owner() {
    let store = store().await;
    let new = new_transcription(OwnerId::new(), "talk.mp3");
    store.create_transcription(&new).await.unwrap();

    let found = store
        .find_transcription(new.transcription_id, OwnerId::new())
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn one_record_per_file() {
    let store = store().await;
    let owner = OwnerId::new();
    let first = new_transcription(owner, "talk.mp3");
    store.create_transcription(&first).await.unwrap();

    let second = NewTranscription {
        transcription_id: TranscriptionId::new(),
        ..first.clone()
    };
    let err = store.create_transcription(&second).await.unwrap_err();
    assert!(matches!(err, StoreError::Constraint(_)));
    assert!(store.read(second.transcription_id).await.is_err());
}

#[tokio::test]
async fn write_sets_status_and_content_and_notifies() {
    let store = store().await;
    let owner = OwnerId::new();
    let new = new_transcription(owner, "talk.mp3");
    store.create_transcription(&new).await.unwrap();
    let mut changes = store.subscribe();

    store
        .write(&update(&new, TranscriptionStatus::Processing, None))
        .await
        .unwrap();
    store
        .write(&update(&new, TranscriptionStatus::Completed, Some("hello world")))
        .await
        .unwrap();

    let record = store.read(new.transcription_id).await.unwrap();
    assert_eq!(record.status, TranscriptionStatus::Completed);
    assert_eq!(record.content.as_deref(), Some("hello world"));
    assert!(record.updated_at >= record.created_at);

    let first = changes.recv().await.unwrap();
    assert_eq!(first.id, new.transcription_id);
    assert_eq!(first.owner_id, owner);
    assert_eq!(first.status, TranscriptionStatus::Processing);
    assert_eq!(changes.recv().await.unwrap().status, TranscriptionStatus::Completed);
}

#[tokio::test]
async fn retry_clears_nothing_but_status() {
    let store = store().await;
    let new = new_transcription(OwnerId::new(), "talk.mp3");
    store.create_transcription(&new).await.unwrap();

    store
        .write(&update(&new, TranscriptionStatus::Processing, None))
        .await
        .unwrap();
    store
        .write(&update(&new, TranscriptionStatus::Pending, None))
        .await
        .unwrap();

    let record = store.read(new.transcription_id).await.unwrap();
    assert_eq!(record.status, TranscriptionStatus::Pending);
    assert!(record.content.is_none());
}

#[tokio::test]
async fn write_to_unknown_record_is_not_found() {
    let store = store().await;
    let new = new_transcription(OwnerId::new(), "ghost.mp3");
    let err = store
        .write(&update(&new, TranscriptionStatus::Processing, None))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(id) if id == new.transcription_id));
}

#[tokio::test]
async fn write_requires_matching_file() {
    let store = store().await;
    let new = new_transcription(OwnerId::new(), "talk.mp3");
    store.create_transcription(&new).await.unwrap();

    let wrong_file = StatusUpdate::new(
        new.transcription_id,
        FileId::new(),
        TranscriptionStatus::Processing,
        None,
    )
    .unwrap();
    assert!(matches!(
        store.write(&wrong_file).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn progress_is_ignored_once_terminal() {
    let store = store().await;
    let new = new_transcription(OwnerId::new(), "talk.mp3");
    store.create_transcription(&new).await.unwrap();

    assert!(store
        .write_progress(new.transcription_id, new.file_id)
        .await
        .unwrap());
    store
        .write(&update(&new, TranscriptionStatus::Error, None))
        .await
        .unwrap();

    assert!(!store
        .write_progress(new.transcription_id, new.file_id)
        .await
        .unwrap());
    let record = store.read(new.transcription_id).await.unwrap();
    assert_eq!(record.status, TranscriptionStatus::Error);

    let missing = store
        .write_progress(TranscriptionId::new(), new.file_id)
        .await;
    assert!(matches!(missing, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn stale_write_never_reopens_a_terminal_record() {
    let store = store().await;
    let new = new_transcription(OwnerId::new(), "talk.mp3");
    store.create_transcription(&new).await.unwrap();
    store
        .write(&update(&new, TranscriptionStatus::Error, None))
        .await
        .unwrap();
    let mut changes = store.subscribe();

    // A late processing or pending echo is accepted but has no effect
    store
        .write(&update(&new, TranscriptionStatus::Processing, None))
        .await
        .unwrap();
    store
        .write(&update(&new, TranscriptionStatus::Pending, None))
        .await
        .unwrap();
    assert_eq!(
        store.read(new.transcription_id).await.unwrap().status,
        TranscriptionStatus::Error
    );
    assert!(changes.try_recv().is_err());

    let unknown = NewTranscription {
        transcription_id: TranscriptionId::new(),
        ..new.clone()
    };
    assert!(matches!(
        store
            .write(&update(&unknown, TranscriptionStatus::Processing, None))
            .await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn list_is_newest_first_and_per_owner() {
    let store = store().await;
    let owner = OwnerId::new();
    let older = new_transcription(owner, "older.mp3");
    store.create_transcription(&older).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let newer = new_transcription(owner, "newer.mp3");
    store.create_transcription(&newer).await.unwrap();
    store
        .create_transcription(&new_transcription(OwnerId::new(), "other.mp3"))
        .await
        .unwrap();

    let listed = store.list_transcriptions(owner).await.unwrap();
    let ids: Vec<_> = listed.iter().map(|e| e.record.id).collect();
    assert_eq!(ids, vec![newer.transcription_id, older.transcription_id]);
}

#[tokio::test]
async fn mark_deletable_keeps_the_record() {
    let store = store().await;
    let owner = OwnerId::new();
    let new = new_transcription(owner, "talk.mp3");
    store.create_transcription(&new).await.unwrap();
    store
        .write(&update(&new, TranscriptionStatus::Processing, None))
        .await
        .unwrap();
    store
        .write(&update(&new, TranscriptionStatus::Error, None))
        .await
        .unwrap();

    assert!(store
        .mark_file_deletable(owner, &new.storage_locator)
        .await
        .unwrap());
    let entry = store
        .find_transcription(new.transcription_id, owner)
        .await
        .unwrap()
        .unwrap();
    assert!(entry.file.deletable);
    assert_eq!(entry.record.status, TranscriptionStatus::Error);

    // Another owner cannot touch the file
    assert!(!store
        .mark_file_deletable(OwnerId::new(), &new.storage_locator)
        .await
        .unwrap());
}

#[tokio::test]
async fn purge_removes_file_and_record() {
    let store = store().await;
    let owner = OwnerId::new();
    let new = new_transcription(owner, "talk.mp3");
    store.create_transcription(&new).await.unwrap();

    assert!(store.purge_file(owner, &new.storage_locator).await.unwrap());
    assert!(matches!(
        store.read(new.transcription_id).await,
        Err(StoreError::NotFound(_))
    ));
    assert!(!store.purge_file(owner, &new.storage_locator).await.unwrap());
}

#[tokio::test]
async fn delete_transcription_removes_both_rows() {
    let store = store().await;
    let owner = OwnerId::new();
    let new = new_transcription(owner, "talk.mp3");
    store.create_transcription(&new).await.unwrap();

    assert!(!store
        .delete_transcription(new.transcription_id, OwnerId::new())
        .await
        .unwrap());
    assert!(store
        .delete_transcription(new.transcription_id, owner)
        .await
        .unwrap());
    assert!(store.list_transcriptions(owner).await.unwrap().is_empty());

    // The storage path is free again
    let reuse = NewTranscription {
        transcription_id: TranscriptionId::new(),
        file_id: FileId::new(),
        ..new.clone()
    };
    store.create_transcription(&reuse).await.unwrap();
}

#[tokio::test]
async fn file_database_persists_across_connections() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("queue.db").display());
    let owner = OwnerId::new();
    let new = new_transcription(owner, "talk.mp3");

    {
        let store = SqliteStore::connect(&url).await.unwrap();
        store.create_transcription(&new).await.unwrap();
    }

    let reopened = SqliteStore::connect(&url).await.unwrap();
    let record = reopened.read(new.transcription_id).await.unwrap();
    assert_eq!(record.status, TranscriptionStatus::Pending);
}
