//! src/services/document_store.rs
//!
//! SqliteDocumentStore — the document-store adapter behind chunked storage.
//! Two collections are modelled as SQLite tables: the parent collection with
//! one row per file entity, and the chunk collection with one row per chunk
//! record. Collection names come from `CollectionConfig`.

use crate::{
    config::CollectionConfig,
    models::{
        chunk::{ChunkPayload, ChunkRecord},
        file::{FileMetadata, StoredFile},
    },
    services::{
        chunk_store::{ChunkStore, Session},
        errors::{TransferError, TransferResult},
        metadata_writer::MetadataWriter,
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

#[derive(FromRow)]
struct FileRow {
    id: Uuid,
    name: String,
    content_type: Option<String>,
    created_at: DateTime<Utc>,
    file_size: f64,
    chunk_count: i64,
    upload_successful: bool,
}

#[derive(FromRow)]
struct MetadataRow {
    file_size: f64,
    chunk_count: i64,
    upload_successful: bool,
}

impl TryFrom<MetadataRow> for FileMetadata {
    type Error = TransferError;

    fn try_from(row: MetadataRow) -> TransferResult<Self> {
        let chunk_count = u32::try_from(row.chunk_count).map_err(|_| {
            TransferError::state(format!("stored chunk count {} is out of range", row.chunk_count))
        })?;
        Ok(Self {
            file_size: row.file_size.max(0.0) as u64,
            chunk_count,
            upload_successful: row.upload_successful,
        })
    }
}

impl TryFrom<FileRow> for StoredFile {
    type Error = TransferError;

    fn try_from(row: FileRow) -> TransferResult<Self> {
        let metadata = FileMetadata::try_from(MetadataRow {
            file_size: row.file_size,
            chunk_count: row.chunk_count,
            upload_successful: row.upload_successful,
        })?;
        Ok(Self {
            id: Some(row.id),
            name: row.name,
            content_type: row.content_type,
            created_at: row.created_at,
            metadata,
        })
    }
}

/// SQLite-backed parent and chunk collections.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,

    collections: CollectionConfig,
}

impl SqliteDocumentStore {
    pub fn new(db: Arc<SqlitePool>, collections: CollectionConfig) -> Self {
        Self { db, collections }
    }

    /// Create both collections if they do not exist yet.
    pub async fn migrate(&self) -> TransferResult<()> {
        let statements = [
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id BLOB PRIMARY KEY NOT NULL,
                    name TEXT NOT NULL,
                    content_type TEXT,
                    created_at TEXT NOT NULL,
                    file_size REAL NOT NULL DEFAULT 0,
                    chunk_count INTEGER NOT NULL DEFAULT 0,
                    upload_successful INTEGER NOT NULL DEFAULT 0
                )",
                self.collections.parent_collection
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id BLOB PRIMARY KEY NOT NULL,
                    parent_id BLOB NOT NULL,
                    seq INTEGER NOT NULL,
                    data BLOB NOT NULL
                )",
                self.collections.chunk_collection
            ),
        ];

        for stmt in &statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    /// Save a new file entity, assigning its id when it has none.
    pub async fn insert_parent(&self, file: &mut StoredFile) -> TransferResult<()> {
        let id = file.id.unwrap_or_else(Uuid::new_v4);
        let sql = format!(
            "INSERT INTO {} (id, name, content_type, created_at, file_size, chunk_count, upload_successful)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            self.collections.parent_collection
        );
        sqlx::query(&sql)
            .bind(id)
            .bind(&file.name)
            .bind(file.content_type.as_deref())
            .bind(file.created_at)
            .bind(file.metadata.file_size as f64)
            .bind(i64::from(file.metadata.chunk_count))
            .bind(file.metadata.upload_successful)
            .execute(&*self.db)
            .await?;
        file.id = Some(id);
        Ok(())
    }

    /// Fetch a saved file entity by id.
    pub async fn fetch_parent(&self, id: Uuid) -> TransferResult<Option<StoredFile>> {
        let sql = format!(
            "SELECT id, name, content_type, created_at, file_size, chunk_count, upload_successful
             FROM {} WHERE id = ?",
            self.collections.parent_collection
        );
        let row = sqlx::query_as::<_, FileRow>(&sql)
            .bind(id)
            .fetch_optional(&*self.db)
            .await?;
        row.map(StoredFile::try_from).transpose()
    }

    /// Number of chunk records currently stored for `parent_id`.
    pub async fn count_chunks(&self, parent_id: Uuid) -> TransferResult<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE parent_id = ?",
            self.collections.chunk_collection
        );
        let count = sqlx::query_scalar::<_, i64>(&sql)
            .bind(parent_id)
            .fetch_one(&*self.db)
            .await?;
        Ok(count.max(0) as u64)
    }

    /// Cheap read against both collections, used by readiness checks.
    pub async fn probe(&self) -> TransferResult<()> {
        for table in [
            &self.collections.parent_collection,
            &self.collections.chunk_collection,
        ] {
            let sql = format!("SELECT COUNT(*) FROM (SELECT 1 FROM {} LIMIT 1)", table);
            sqlx::query_scalar::<_, i64>(&sql)
                .fetch_one(&*self.db)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ChunkStore for SqliteDocumentStore {
    async fn insert(&self, chunk: &ChunkRecord, session: Session<'_>) -> TransferResult<()> {
        let sql = format!(
            "INSERT INTO {} (id, parent_id, seq, data) VALUES (?, ?, ?, ?)",
            self.collections.chunk_collection
        );
        let query = sqlx::query(&sql)
            .bind(chunk.id)
            .bind(chunk.parent_id)
            .bind(chunk.seq)
            .bind(&chunk.data[..]);
        match session {
            Some(conn) => query.execute(conn).await?,
            None => query.execute(&*self.db).await?,
        };
        Ok(())
    }

    async fn delete_by_parent(
        &self,
        parent_id: Uuid,
        session: Session<'_>,
    ) -> TransferResult<u64> {
        let sql = format!(
            "DELETE FROM {} WHERE parent_id = ?",
            self.collections.chunk_collection
        );
        let query = sqlx::query(&sql).bind(parent_id);
        let result = match session {
            Some(conn) => query.execute(conn).await?,
            None => query.execute(&*self.db).await?,
        };
        Ok(result.rows_affected())
    }

    async fn fetch_batch(
        &self,
        parent_id: Uuid,
        after: Option<i64>,
        limit: u32,
        session: Session<'_>,
    ) -> TransferResult<Vec<ChunkPayload>> {
        let sql = format!(
            "SELECT seq, data FROM {}
             WHERE parent_id = ? AND seq > ?
             ORDER BY seq ASC LIMIT ?",
            self.collections.chunk_collection
        );
        let query = sqlx::query_as::<_, (i64, Vec<u8>)>(&sql)
            .bind(parent_id)
            .bind(after.unwrap_or(-1))
            .bind(i64::from(limit));
        let rows = match session {
            Some(conn) => query.fetch_all(conn).await?,
            None => query.fetch_all(&*self.db).await?,
        };
        Ok(rows
            .into_iter()
            .map(|(seq, data)| ChunkPayload {
                seq,
                data: Bytes::from(data),
            })
            .collect())
    }
}

#[async_trait]
impl MetadataWriter for SqliteDocumentStore {
    async fn ensure_index(&self, session: Session<'_>) -> TransferResult<()> {
        let sql = format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} (parent_id, seq)",
            self.collections.chunk_index_name(),
            self.collections.chunk_collection
        );
        let query = sqlx::query(&sql);
        match session {
            Some(conn) => query.execute(conn).await?,
            None => query.execute(&*self.db).await?,
        };
        Ok(())
    }

    async fn load(
        &self,
        parent_id: Uuid,
        session: Session<'_>,
    ) -> TransferResult<Option<FileMetadata>> {
        let sql = format!(
            "SELECT file_size, chunk_count, upload_successful FROM {} WHERE id = ?",
            self.collections.parent_collection
        );
        let query = sqlx::query_as::<_, MetadataRow>(&sql).bind(parent_id);
        let row = match session {
            Some(conn) => query.fetch_optional(conn).await?,
            None => query.fetch_optional(&*self.db).await?,
        };
        row.map(FileMetadata::try_from).transpose()
    }

    async fn finalize(
        &self,
        parent_id: Uuid,
        metadata: &FileMetadata,
        session: Session<'_>,
    ) -> TransferResult<()> {
        let sql = format!(
            "UPDATE {} SET file_size = ?, chunk_count = ?, upload_successful = ? WHERE id = ?",
            self.collections.parent_collection
        );
        let query = sqlx::query(&sql)
            .bind(metadata.file_size as f64)
            .bind(i64::from(metadata.chunk_count))
            .bind(metadata.upload_successful)
            .bind(parent_id);
        let result = match session {
            Some(conn) => query.execute(conn).await?,
            None => query.execute(&*self.db).await?,
        };
        if result.rows_affected() == 0 {
            return Err(TransferError::UnsavedParent(parent_id));
        }
        Ok(())
    }
}
