//! SQLite status and metadata store (sqlx)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::application::ports::{
    MetadataStore, NewTranscription, StatusStore, StoreError, StoredFile, TranscriptionEntry,
};
use crate::domain::ids::{FileId, OwnerId, TranscriptionId};
use crate::domain::storage::StorageLocator;
use crate::domain::transcription::{
    RecordChange, StatusUpdate, TranscriptionRecord, TranscriptionStatus,
};

use super::CHANGE_CHANNEL_CAPACITY;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS files (
        id           TEXT PRIMARY KEY NOT NULL,
        user_id      TEXT NOT NULL,
        file_name    TEXT NOT NULL,
        mime_type    TEXT NOT NULL,
        size_bytes   INTEGER NOT NULL CHECK (size_bytes >= 0),
        storage_path TEXT NOT NULL UNIQUE,
        deletable    INTEGER NOT NULL DEFAULT 0,
        created_at   TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transcriptions (
        id         TEXT PRIMARY KEY NOT NULL,
        file_id    TEXT NOT NULL UNIQUE REFERENCES files(id) ON DELETE CASCADE,
        user_id    TEXT NOT NULL,
        content    TEXT,
        status     TEXT NOT NULL DEFAULT 'pending'
                   CHECK (status IN ('pending', 'processing', 'completed', 'error')),
        language   TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        CHECK ((status = 'completed') = (content IS NOT NULL))
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_transcriptions_user ON transcriptions (user_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_files_user_path ON files (user_id, storage_path)",
];

const ENTRY_COLUMNS: &str = r#"
    t.id, t.file_id, t.user_id, t.content, t.status, t.language, t.created_at, t.updated_at,
    f.file_name, f.mime_type, f.size_bytes, f.storage_path, f.deletable,
    f.created_at AS file_created_at
"#;

/// sqlx-backed store. One pooled connection serializes all writes,
/// which also keeps `sqlite::memory:` databases alive.
pub struct SqliteStore {
    pool: SqlitePool,
    changes: broadcast::Sender<RecordChange>,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `database_url` and apply the schema.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(map_sqlx_error)?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(map_sqlx_error)?;

        let store = Self::with_pool(pool);
        store.migrate().await?;
        info!(database_url, "SQLite store ready");
        Ok(store)
    }

    /// Private in-memory database
    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::connect("sqlite::memory:").await
    }

    pub fn with_pool(pool: SqlitePool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { pool, changes }
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(*statement)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        }
        debug!("Schema applied");
        Ok(())
    }

    fn notify(&self, id: TranscriptionId, owner_id: OwnerId, status: TranscriptionStatus) {
        let _ = self.changes.send(RecordChange {
            id,
            owner_id,
            status,
        });
    }

    async fn exists(&self, id: TranscriptionId, file_id: FileId) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM transcriptions WHERE id = ? AND file_id = ?")
            .bind(id.to_string())
            .bind(file_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.is_some())
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db)
            if db.is_unique_violation()
                || db.is_check_violation()
                || db.is_foreign_key_violation() =>
        {
            StoreError::Constraint(db.message().to_string())
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(err.to_string())
        }
        _ => StoreError::Database(err.to_string()),
    }
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name).map_err(map_sqlx_error)
}

fn parse_column<T: FromStr>(row: &SqliteRow, name: &str) -> Result<T, StoreError>
where
    T::Err: std::fmt::Display,
{
    let raw: String = column(row, name)?;
    raw.parse()
        .map_err(|e: T::Err| StoreError::Database(format!("bad {name} \"{raw}\": {e}")))
}

fn timestamp_column(row: &SqliteRow, name: &str) -> Result<DateTime<Utc>, StoreError> {
    let raw: String = column(row, name)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Database(format!("bad {name} \"{raw}\": {e}")))
}

fn record_from_row(row: &SqliteRow) -> Result<TranscriptionRecord, StoreError> {
    Ok(TranscriptionRecord {
        id: parse_column(row, "id")?,
        file_id: parse_column(row, "file_id")?,
        owner_id: parse_column(row, "user_id")?,
        content: column(row, "content")?,
        status: parse_column(row, "status")?,
        language: column(row, "language")?,
        created_at: timestamp_column(row, "created_at")?,
        updated_at: timestamp_column(row, "updated_at")?,
    })
}

fn entry_from_row(row: &SqliteRow) -> Result<TranscriptionEntry, StoreError> {
    let record = record_from_row(row)?;
    let size_bytes: i64 = column(row, "size_bytes")?;
    let deletable: i64 = column(row, "deletable")?;
    let file = StoredFile {
        id: record.file_id,
        owner_id: record.owner_id,
        file_name: column(row, "file_name")?,
        mime_type: column(row, "mime_type")?,
        size_bytes: size_bytes.max(0) as u64,
        storage_locator: parse_column::<StorageLocator>(row, "storage_path")?,
        deletable: deletable != 0,
        created_at: timestamp_column(row, "file_created_at")?,
    };
    Ok(TranscriptionEntry { record, file })
}

#[async_trait]
impl StatusStore for SqliteStore {
    async fn read(&self, id: TranscriptionId) -> Result<TranscriptionRecord, StoreError> {
        let row = sqlx::query("SELECT * FROM transcriptions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .ok_or(StoreError::NotFound(id))?;
        record_from_row(&row)
    }

    async fn write(&self, update: &StatusUpdate) -> Result<(), StoreError> {
        let id = update.transcription_id();
        let now = Utc::now().to_rfc3339();
        // A terminal record only accepts another terminal status
        let row = sqlx::query(
            r#"
            UPDATE transcriptions
            SET status = ?, content = ?, updated_at = ?
            WHERE id = ? AND file_id = ?
              AND (status NOT IN ('completed', 'error') OR ? IN ('completed', 'error'))
            RETURNING user_id
            "#,
        )
        .bind(update.status().as_str())
        .bind(update.content())
        .bind(&now)
        .bind(id.to_string())
        .bind(update.file_id().to_string())
        .bind(update.status().as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => {
                let owner: OwnerId = parse_column(&row, "user_id")?;
                self.notify(id, owner, update.status());
                Ok(())
            }
            None if self.exists(id, update.file_id()).await? => {
                debug!(transcription_id = %id, status = %update.status(), "Record already terminal, write ignored");
                Ok(())
            }
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn write_progress(
        &self,
        id: TranscriptionId,
        file_id: FileId,
    ) -> Result<bool, StoreError> {
        let now = Utc::now().to_rfc3339();
        let row = sqlx::query(
            r#"
            UPDATE transcriptions
            SET status = 'processing', updated_at = ?
            WHERE id = ? AND file_id = ? AND status NOT IN ('completed', 'error')
            RETURNING user_id
            "#,
        )
        .bind(&now)
        .bind(id.to_string())
        .bind(file_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => {
                let owner: OwnerId = parse_column(&row, "user_id")?;
                self.notify(id, owner, TranscriptionStatus::Processing);
                Ok(true)
            }
            None if self.exists(id, file_id).await? => Ok(false),
            None => Err(StoreError::NotFound(id)),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<RecordChange> {
        self.changes.subscribe()
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn create_transcription(
        &self,
        new: &NewTranscription,
    ) -> Result<TranscriptionRecord, StoreError> {
        let record = TranscriptionRecord::pending(
            new.transcription_id,
            new.file_id,
            new.owner_id,
            new.language.clone(),
        );
        let created = record.created_at.to_rfc3339();

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        sqlx::query(
            r#"
            INSERT INTO files (id, user_id, file_name, mime_type, size_bytes, storage_path, deletable, created_at)
            VALUES (?, ?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(new.file_id.to_string())
        .bind(new.owner_id.to_string())
        .bind(&new.file_name)
        .bind(&new.mime_type)
        .bind(new.size_bytes as i64)
        .bind(new.storage_locator.as_str())
        .bind(&created)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        sqlx::query(
            r#"
            INSERT INTO transcriptions (id, file_id, user_id, content, status, language, created_at, updated_at)
            VALUES (?, ?, ?, NULL, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.file_id.to_string())
        .bind(record.owner_id.to_string())
        .bind(record.status.as_str())
        .bind(record.language.as_deref())
        .bind(&created)
        .bind(&created)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(job_id = %record.id, owner_id = %record.owner_id, "Transcription created");
        Ok(record)
    }

    async fn find_transcription(
        &self,
        id: TranscriptionId,
        owner: OwnerId,
    ) -> Result<Option<TranscriptionEntry>, StoreError> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM transcriptions t JOIN files f ON f.id = t.file_id \
             WHERE t.id = ? AND t.user_id = ?"
        );
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .bind(owner.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.as_ref().map(entry_from_row).transpose()
    }

    async fn list_transcriptions(
        &self,
        owner: OwnerId,
    ) -> Result<Vec<TranscriptionEntry>, StoreError> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM transcriptions t JOIN files f ON f.id = t.file_id \
             WHERE t.user_id = ? ORDER BY t.created_at DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(owner.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn mark_file_deletable(
        &self,
        owner: OwnerId,
        locator: &StorageLocator,
    ) -> Result<bool, StoreError> {
        let result =
            sqlx::query("UPDATE files SET deletable = 1 WHERE user_id = ? AND storage_path = ?")
                .bind(owner.to_string())
                .bind(locator.as_str())
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_file(
        &self,
        owner: OwnerId,
        locator: &StorageLocator,
    ) -> Result<bool, StoreError> {
        // Records go with the file through ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM files WHERE user_id = ? AND storage_path = ?")
            .bind(owner.to_string())
            .bind(locator.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_transcription(
        &self,
        id: TranscriptionId,
        owner: OwnerId,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let row = sqlx::query(
            "DELETE FROM transcriptions WHERE id = ? AND user_id = ? RETURNING file_id",
        )
        .bind(id.to_string())
        .bind(owner.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            tx.rollback().await.map_err(map_sqlx_error)?;
            return Ok(false);
        };
        let file_id: String = column(&row, "file_id")?;
        sqlx::query("DELETE FROM files WHERE id = ? AND user_id = ?")
            .bind(&file_id)
            .bind(owner.to_string())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(true)
    }
}
