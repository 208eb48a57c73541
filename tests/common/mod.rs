//! Shared fixtures for integration tests.
//! Note: #[allow(dead_code)] because each test file compiles common/ separately.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chunked_object_store::{
    ChunkStore, CollectionConfig, FileMetadata, MetadataWriter, Session, SqliteDocumentStore,
    StoredFile, TransferError, TransferResult,
    models::chunk::{ChunkPayload, ChunkRecord},
};
use sqlx::sqlite::SqlitePoolOptions;
use std::{
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    task::{Context, Poll},
    time::Duration,
};
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const KIB: usize = 1024;

/// A migrated store on a private in-memory database.
pub async fn memory_store() -> SqliteDocumentStore {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory sqlite");
    let store = SqliteDocumentStore::new(Arc::new(pool), CollectionConfig::default());
    store.migrate().await.expect("Failed to migrate");
    store
}

/// Save a fresh file entity.
pub async fn saved_file(store: &SqliteDocumentStore) -> StoredFile {
    let mut file = StoredFile::new("payload.bin", Some("application/octet-stream".into()));
    store
        .insert_parent(&mut file)
        .await
        .expect("Failed to save file entity");
    file
}

/// Deterministic, non-repeating-per-chunk test payload.
pub fn pattern_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8 ^ (i / 4093) as u8).collect()
}

/// Durable metadata of `file`.
pub async fn durable_metadata(store: &SqliteDocumentStore, file: &StoredFile) -> FileMetadata {
    store
        .load(file.id.expect("saved"), None)
        .await
        .expect("load metadata")
        .expect("parent exists")
}

/// Wraps the SQLite store and injects failures, delays and cancellations.
pub struct FaultyStore {
    pub inner: SqliteDocumentStore,
    /// 1-based insert call that fails.
    pub fail_insert_at: Option<u32>,
    /// Cancel this token once this many inserts succeeded.
    pub cancel_after_inserts: Option<(u32, CancellationToken)>,
    /// Fail every delete after the first one.
    pub fail_cleanup: bool,
    /// Delay applied to every batch fetch.
    pub fetch_delay: Option<Duration>,
    /// Fail every index creation.
    pub fail_ensure_index: bool,
    pub inserts: AtomicU32,
    pub deletes: AtomicU32,
    pub finalizes: AtomicU32,
    /// Deletes seen when the last finalize ran.
    pub deletes_at_finalize: AtomicU32,
    pub cleanup_failed: AtomicBool,
}

impl FaultyStore {
    pub fn new(inner: SqliteDocumentStore) -> Self {
        Self {
            inner,
            fail_insert_at: None,
            cancel_after_inserts: None,
            fail_cleanup: false,
            fetch_delay: None,
            fail_ensure_index: false,
            inserts: AtomicU32::new(0),
            deletes: AtomicU32::new(0),
            finalizes: AtomicU32::new(0),
            deletes_at_finalize: AtomicU32::new(0),
            cleanup_failed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ChunkStore for FaultyStore {
    async fn insert(&self, chunk: &ChunkRecord, session: Session<'_>) -> TransferResult<()> {
        let call = self.inserts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_insert_at == Some(call) {
            return Err(TransferError::Store(sqlx::Error::PoolTimedOut));
        }
        self.inner.insert(chunk, session).await?;
        if let Some((after, token)) = &self.cancel_after_inserts {
            if call == *after {
                token.cancel();
            }
        }
        Ok(())
    }

    async fn delete_by_parent(
        &self,
        parent_id: Uuid,
        session: Session<'_>,
    ) -> TransferResult<u64> {
        let call = self.deletes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_cleanup && call > 1 {
            self.cleanup_failed.store(true, Ordering::SeqCst);
            return Err(TransferError::Store(sqlx::Error::PoolClosed));
        }
        self.inner.delete_by_parent(parent_id, session).await
    }

    async fn fetch_batch(
        &self,
        parent_id: Uuid,
        after: Option<i64>,
        limit: u32,
        session: Session<'_>,
    ) -> TransferResult<Vec<ChunkPayload>> {
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.fetch_batch(parent_id, after, limit, session).await
    }
}

#[async_trait]
impl MetadataWriter for FaultyStore {
    async fn ensure_index(&self, session: Session<'_>) -> TransferResult<()> {
        if self.fail_ensure_index {
            return Err(TransferError::Store(sqlx::Error::PoolTimedOut));
        }
        self.inner.ensure_index(session).await
    }

    async fn load(
        &self,
        parent_id: Uuid,
        session: Session<'_>,
    ) -> TransferResult<Option<FileMetadata>> {
        self.inner.load(parent_id, session).await
    }

    async fn finalize(
        &self,
        parent_id: Uuid,
        metadata: &FileMetadata,
        session: Session<'_>,
    ) -> TransferResult<()> {
        self.finalizes.fetch_add(1, Ordering::SeqCst);
        self.deletes_at_finalize
            .store(self.deletes.load(Ordering::SeqCst), Ordering::SeqCst);
        self.inner.finalize(parent_id, metadata, session).await
    }
}

/// In-memory sink that cancels a token after a given number of writes.
pub struct CancelAfterWrites {
    pub data: Vec<u8>,
    pub writes: u32,
    pub limit: u32,
    pub token: CancellationToken,
}

impl CancelAfterWrites {
    pub fn new(limit: u32, token: CancellationToken) -> Self {
        Self {
            data: Vec::new(),
            writes: 0,
            limit,
            token,
        }
    }
}

impl AsyncWrite for CancelAfterWrites {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.data.extend_from_slice(buf);
        self.writes += 1;
        if self.writes == self.limit {
            self.token.cancel();
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Bytes of a chunk-sized payload for building streaming sources.
pub fn bytes_of(len: usize, fill: u8) -> Bytes {
    Bytes::from(vec![fill; len])
}
