//! src/services/transfer_service.rs
//!
//! TransferService — the entry point for chunked uploads and downloads of
//! any entity implementing `HasChunkedStorage`. Each call builds its own
//! pipeline, so one service value can be shared freely between tasks.
//! Concurrent uploads to the *same* entity are not coordinated here and
//! must be serialized by the caller.

use crate::{
    config::{DEFAULT_BATCH_SIZE, DEFAULT_CHUNK_SIZE_KB},
    models::file::{FileMetadata, HasChunkedStorage},
    services::{
        chunk_store::{ChunkStore, Session},
        document_store::SqliteDocumentStore,
        download::DownloadPipeline,
        errors::{TransferError, TransferResult},
        metadata_writer::MetadataWriter,
        upload::UploadPipeline,
    },
};
use std::{sync::Arc, time::Duration};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

pub struct TransferService<S: ?Sized = SqliteDocumentStore> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for TransferService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> TransferService<S>
where
    S: ChunkStore + MetadataWriter + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Upload `source` into the chunks of `entity`.
    ///
    /// Replaces any previous upload. On return the entity's metadata mirrors
    /// what was finalized: the new totals on success, empty and unreadable
    /// on failure.
    ///
    /// Stored metadata is written once, after the last chunk. While a
    /// re-upload is running, the previous metadata still reads as successful
    /// over chunks that are being replaced, so a crash in that window leaves
    /// a readable object whose data does not match its size. Pass a
    /// `session` holding a transaction to make the replacement atomic.
    pub async fn upload_data<E, R>(
        &self,
        entity: &mut E,
        source: R,
        chunk_size_kb: u32,
        cancel: Option<CancellationToken>,
        mut session: Session<'_>,
    ) -> TransferResult<()>
    where
        E: HasChunkedStorage + Send + ?Sized,
        R: AsyncRead + Unpin + Send,
    {
        let parent_id = saved_id(entity)?;
        let pipeline = UploadPipeline::new(&*self.store, parent_id, chunk_size_kb)?;
        pipeline.prepare(session.as_deref_mut()).await?;

        let cancel = cancel.unwrap_or_default();
        match pipeline.run(source, &cancel, session).await {
            Ok(metadata) => {
                *entity.file_metadata_mut() = metadata;
                Ok(())
            }
            Err(err) => {
                *entity.file_metadata_mut() = FileMetadata::default();
                Err(err)
            }
        }
    }

    /// `upload_data` with the default chunk size and no cancellation.
    pub async fn upload<E, R>(&self, entity: &mut E, source: R) -> TransferResult<()>
    where
        E: HasChunkedStorage + Send + ?Sized,
        R: AsyncRead + Unpin + Send,
    {
        self.upload_data(entity, source, DEFAULT_CHUNK_SIZE_KB, None, None)
            .await
    }

    /// `upload_data` canceled once `timeout` elapses.
    pub async fn upload_data_with_timeout<E, R>(
        &self,
        entity: &mut E,
        source: R,
        timeout: Duration,
        chunk_size_kb: u32,
        session: Session<'_>,
    ) -> TransferResult<()>
    where
        E: HasChunkedStorage + Send + ?Sized,
        R: AsyncRead + Unpin + Send,
    {
        let deadline = Deadline::start(timeout);
        self.upload_data(entity, source, chunk_size_kb, Some(deadline.token()), session)
            .await
    }

    /// Fail unless `entity` is saved and its last upload succeeded.
    pub async fn check_readable<E>(&self, entity: &E, session: Session<'_>) -> TransferResult<()>
    where
        E: HasChunkedStorage + Sync + ?Sized,
    {
        let parent_id = saved_id(entity)?;
        DownloadPipeline::new(&*self.store, parent_id, DEFAULT_BATCH_SIZE)?
            .check_readable(session)
            .await
    }

    /// Write the data of `entity` into `sink`, fetching `batch_size` chunks
    /// per round trip. Returns the number of bytes written.
    pub async fn download_data<E, W>(
        &self,
        entity: &E,
        sink: &mut W,
        batch_size: u32,
        cancel: Option<CancellationToken>,
        session: Session<'_>,
    ) -> TransferResult<u64>
    where
        E: HasChunkedStorage + Sync + ?Sized,
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let parent_id = saved_id(entity)?;
        let cancel = cancel.unwrap_or_default();
        DownloadPipeline::new(&*self.store, parent_id, batch_size)?
            .run(sink, &cancel, session)
            .await
    }

    /// `download_data` with the default batch size and no cancellation.
    pub async fn download<E, W>(&self, entity: &E, sink: &mut W) -> TransferResult<u64>
    where
        E: HasChunkedStorage + Sync + ?Sized,
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        self.download_data(entity, sink, DEFAULT_BATCH_SIZE, None, None)
            .await
    }

    /// `download_data` canceled once `timeout` elapses.
    pub async fn download_data_with_timeout<E, W>(
        &self,
        entity: &E,
        sink: &mut W,
        timeout: Duration,
        batch_size: u32,
        session: Session<'_>,
    ) -> TransferResult<u64>
    where
        E: HasChunkedStorage + Sync + ?Sized,
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let deadline = Deadline::start(timeout);
        self.download_data(entity, sink, batch_size, Some(deadline.token()), session)
            .await
    }
}

fn saved_id<E: HasChunkedStorage + ?Sized>(entity: &E) -> TransferResult<Uuid> {
    entity
        .entity_id()
        .ok_or_else(|| TransferError::validation("file entity has not been saved"))
}

/// Cancels its token when the timeout elapses; the timer stops on drop.
struct Deadline {
    token: CancellationToken,
    timer: JoinHandle<()>,
}

impl Deadline {
    fn start(timeout: Duration) -> Self {
        let token = CancellationToken::new();
        let trigger = token.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            debug!(?timeout, "transfer deadline reached");
            trigger.cancel();
        });
        Self { token, timer }
    }

    fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for Deadline {
    fn drop(&mut self) {
        self.timer.abort();
    }
}
