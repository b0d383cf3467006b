//! Metadata store trait and SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{ChunkRepo, UploadRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: UploadRepo + ChunkRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store and run migrations.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MetadataError::Internal(format!("create db directory: {e}")))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection avoids
            // persistent "database is locked" failures under axum concurrency.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::debug!(path = %path.display(), "SQLite metadata store ready");
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Repository implementations for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::{ChunkRow, UploadRow};
    use crate::repos::FinalizeClaim;
    use barge_core::UploadStatus;
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[async_trait]
    impl UploadRepo for SqliteStore {
        async fn create_upload(&self, upload: &UploadRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO uploads (
                    upload_id, filename, total_size, total_chunks, chunk_size,
                    status, final_hash, error_detail, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(upload.upload_id)
            .bind(&upload.filename)
            .bind(upload.total_size)
            .bind(upload.total_chunks)
            .bind(upload.chunk_size)
            .bind(&upload.status)
            .bind(&upload.final_hash)
            .bind(&upload.error_detail)
            .bind(upload.created_at)
            .bind(upload.updated_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn get_upload(&self, upload_id: Uuid) -> MetadataResult<Option<UploadRow>> {
            let row =
                sqlx::query_as::<_, UploadRow>("SELECT * FROM uploads WHERE upload_id = ?")
                    .bind(upload_id)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }

        async fn find_resumable(
            &self,
            filename: &str,
            total_size: i64,
        ) -> MetadataResult<Option<UploadRow>> {
            // Most recent first so resume deterministically reattaches to the
            // latest attempt when stale duplicates exist.
            let row = sqlx::query_as::<_, UploadRow>(
                "SELECT * FROM uploads WHERE filename = ? AND total_size = ? AND status = ? \
                 ORDER BY created_at DESC LIMIT 1",
            )
            .bind(filename)
            .bind(total_size)
            .bind(UploadStatus::Uploading.as_str())
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn begin_processing(
            &self,
            upload_id: Uuid,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<Option<FinalizeClaim>> {
            // Single conditional UPDATE: SQLite executes it atomically, and
            // rows_affected tells the caller whether it won the transition.
            let result = sqlx::query(
                "UPDATE uploads SET status = ?, updated_at = ? \
                 WHERE upload_id = ? AND status = ?",
            )
            .bind(UploadStatus::Processing.as_str())
            .bind(updated_at)
            .bind(upload_id)
            .bind(UploadStatus::Uploading.as_str())
            .execute(&self.pool)
            .await?;

            let Some(row) = self.get_upload(upload_id).await? else {
                return Ok(None);
            };

            if result.rows_affected() > 0 {
                Ok(Some(FinalizeClaim::Claimed(row)))
            } else {
                Ok(Some(FinalizeClaim::Observed(row)))
            }
        }

        async fn complete_upload(
            &self,
            upload_id: Uuid,
            final_hash: &str,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE uploads SET status = ?, final_hash = ?, updated_at = ? \
                 WHERE upload_id = ? AND status = ?",
            )
            .bind(UploadStatus::Completed.as_str())
            .bind(final_hash)
            .bind(updated_at)
            .bind(upload_id)
            .bind(UploadStatus::Processing.as_str())
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                let from = self
                    .get_upload(upload_id)
                    .await?
                    .map(|row| row.status)
                    .ok_or_else(|| {
                        MetadataError::NotFound(format!("upload {upload_id} not found"))
                    })?;
                return Err(MetadataError::InvalidStateTransition {
                    from,
                    to: UploadStatus::Completed.as_str().to_string(),
                });
            }
            Ok(())
        }

        async fn fail_upload(
            &self,
            upload_id: Uuid,
            error_detail: Option<&str>,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            sqlx::query(
                "UPDATE uploads SET status = ?, error_detail = ?, updated_at = ? \
                 WHERE upload_id = ? AND status IN (?, ?)",
            )
            .bind(UploadStatus::Failed.as_str())
            .bind(error_detail)
            .bind(updated_at)
            .bind(upload_id)
            .bind(UploadStatus::Uploading.as_str())
            .bind(UploadStatus::Processing.as_str())
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn get_stale_uploads(
            &self,
            older_than: OffsetDateTime,
            limit: u32,
        ) -> MetadataResult<Vec<UploadRow>> {
            let rows = sqlx::query_as::<_, UploadRow>(
                "SELECT * FROM uploads WHERE status = ? AND updated_at < ? \
                 ORDER BY updated_at ASC LIMIT ?",
            )
            .bind(UploadStatus::Uploading.as_str())
            .bind(older_than)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn delete_upload(&self, upload_id: Uuid) -> MetadataResult<()> {
            let result = sqlx::query("DELETE FROM uploads WHERE upload_id = ?")
                .bind(upload_id)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "upload {upload_id} not found"
                )));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ChunkRepo for SqliteStore {
        async fn upsert_chunk(&self, chunk: &ChunkRow) -> MetadataResult<()> {
            let mut tx = self.pool.begin().await?;

            sqlx::query(
                r#"
                INSERT INTO chunks (upload_id, chunk_index, status, received_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT (upload_id, chunk_index)
                DO UPDATE SET status = excluded.status, received_at = excluded.received_at
                "#,
            )
            .bind(chunk.upload_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.status)
            .bind(chunk.received_at)
            .execute(&mut *tx)
            .await?;

            // Chunk activity keeps the parent upload out of the stale sweep window.
            sqlx::query("UPDATE uploads SET updated_at = ? WHERE upload_id = ?")
                .bind(chunk.received_at)
                .bind(chunk.upload_id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(())
        }

        async fn get_chunk(
            &self,
            upload_id: Uuid,
            chunk_index: i64,
        ) -> MetadataResult<Option<ChunkRow>> {
            let row = sqlx::query_as::<_, ChunkRow>(
                "SELECT * FROM chunks WHERE upload_id = ? AND chunk_index = ?",
            )
            .bind(upload_id)
            .bind(chunk_index)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn get_uploaded_indexes(&self, upload_id: Uuid) -> MetadataResult<Vec<i64>> {
            let indexes: Vec<i64> = sqlx::query_scalar(
                "SELECT chunk_index FROM chunks WHERE upload_id = ? ORDER BY chunk_index ASC",
            )
            .bind(upload_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(indexes)
        }

        async fn count_chunks(&self, upload_id: Uuid) -> MetadataResult<i64> {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE upload_id = ?")
                .bind(upload_id)
                .fetch_one(&self.pool)
                .await?;
            Ok(count)
        }

        async fn delete_chunks(&self, upload_id: Uuid) -> MetadataResult<()> {
            sqlx::query("DELETE FROM chunks WHERE upload_id = ?")
                .bind(upload_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }
    }
}

const SCHEMA_SQL: &str = r#"
-- Uploads: one row per transfer attempt
CREATE TABLE IF NOT EXISTS uploads (
    upload_id BLOB PRIMARY KEY,
    filename TEXT NOT NULL,
    total_size INTEGER NOT NULL,
    total_chunks INTEGER NOT NULL,
    chunk_size INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'UPLOADING',
    final_hash TEXT,
    error_detail TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_uploads_status_updated ON uploads(status, updated_at);
CREATE INDEX IF NOT EXISTS idx_uploads_resume ON uploads(filename, total_size, status);

-- Chunks: receipt records keyed by (upload_id, chunk_index)
CREATE TABLE IF NOT EXISTS chunks (
    upload_id BLOB NOT NULL,
    chunk_index INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'UPLOADED',
    received_at TEXT NOT NULL,
    PRIMARY KEY (upload_id, chunk_index),
    FOREIGN KEY (upload_id) REFERENCES uploads(upload_id) ON DELETE CASCADE
);
"#;
