//! Upload pipeline: source stream -> bounded chunks -> chunk collection.
//!
//! The source is read in fixed 64 KiB units and buffered until a full chunk
//! is available, so peak memory stays at one chunk plus one read unit no
//! matter how large the target chunk size is. Every run ends with exactly
//! one metadata finalize, and only a run that durably wrote its terminal
//! chunk finalizes with `upload_successful = true`.

use crate::{
    models::{chunk::ChunkRecord, file::FileMetadata},
    services::{
        chunk_store::{ChunkStore, Session},
        errors::{TransferError, TransferResult},
        metadata_writer::MetadataWriter,
    },
};
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Granularity of reads from the source.
pub const READ_UNIT: usize = 64 * 1024;

pub const MIN_CHUNK_SIZE_KB: u32 = 128;
pub const MAX_CHUNK_SIZE_KB: u32 = 4096;

/// Check a chunk size in KiB and convert it to bytes.
pub fn chunk_size_bytes(chunk_size_kb: u32) -> TransferResult<usize> {
    if !(MIN_CHUNK_SIZE_KB..=MAX_CHUNK_SIZE_KB).contains(&chunk_size_kb) {
        return Err(TransferError::validation(format!(
            "chunk size must be between {}KB and {}KB, got {}KB",
            MIN_CHUNK_SIZE_KB, MAX_CHUNK_SIZE_KB, chunk_size_kb
        )));
    }
    Ok(chunk_size_kb as usize * 1024)
}

/// Buffer and running totals of a single upload attempt.
#[derive(Debug)]
struct UploadSession {
    parent_id: Uuid,
    chunk_size: usize,
    buffer: BytesMut,
    file_size: u64,
    chunk_count: u32,
    upload_successful: bool,
}

impl UploadSession {
    fn new(parent_id: Uuid, chunk_size: usize) -> Self {
        Self {
            parent_id,
            chunk_size,
            buffer: BytesMut::new(),
            file_size: 0,
            chunk_count: 0,
            upload_successful: false,
        }
    }

    fn reset(&mut self) {
        self.buffer = BytesMut::new();
        self.file_size = 0;
        self.chunk_count = 0;
        self.upload_successful = false;
    }

    fn metadata(&self) -> FileMetadata {
        FileMetadata {
            file_size: self.file_size,
            chunk_count: self.chunk_count,
            upload_successful: self.upload_successful,
        }
    }
}

/// Uploads one source into the chunks of one parent object.
pub struct UploadPipeline<'a, S: ?Sized> {
    store: &'a S,
    parent_id: Uuid,
    chunk_size: usize,
}

impl<'a, S> UploadPipeline<'a, S>
where
    S: ChunkStore + MetadataWriter + ?Sized,
{
    /// Fails with a validation error before any I/O when the chunk size is
    /// outside 128..=4096 KiB.
    pub fn new(store: &'a S, parent_id: Uuid, chunk_size_kb: u32) -> TransferResult<Self> {
        Ok(Self {
            store,
            parent_id,
            chunk_size: chunk_size_bytes(chunk_size_kb)?,
        })
    }

    /// Check the parent is saved and the chunk index exists.
    ///
    /// Nothing has been mutated if this fails, and this phase never
    /// finalizes: a failure here leaves the previous upload readable.
    pub async fn prepare(&self, mut session: Session<'_>) -> TransferResult<()> {
        if self
            .store
            .load(self.parent_id, session.as_deref_mut())
            .await?
            .is_none()
        {
            return Err(TransferError::UnsavedParent(self.parent_id));
        }
        self.store.ensure_index(session).await
    }

    /// Run the upload and finalize the parent's metadata.
    ///
    /// On failure the chunks written so far are removed before the error is
    /// returned, and the parent is finalized as not readable.
    pub async fn run<R>(
        &self,
        source: R,
        cancel: &CancellationToken,
        mut session: Session<'_>,
    ) -> TransferResult<FileMetadata>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut upload = UploadSession::new(self.parent_id, self.chunk_size);

        let outcome = match self
            .transfer(&mut upload, source, cancel, session.as_deref_mut())
            .await
        {
            Ok(()) => Ok(()),
            Err(err) => Err(self.clean_up(&mut upload, err, session.as_deref_mut()).await),
        };

        let metadata = upload.metadata();
        let finalized = self
            .store
            .finalize(self.parent_id, &metadata, session)
            .await;

        match (outcome, finalized) {
            (Ok(()), Ok(())) => {
                info!(
                    parent_id = %self.parent_id,
                    file_size = metadata.file_size,
                    chunk_count = metadata.chunk_count,
                    "upload finalized"
                );
                Ok(metadata)
            }
            (Ok(()), Err(err)) => Err(err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(finalize_err)) => {
                warn!(
                    parent_id = %self.parent_id,
                    error = %finalize_err,
                    "failed to finalize metadata after failed upload"
                );
                Err(err)
            }
        }
    }

    async fn transfer<R>(
        &self,
        upload: &mut UploadSession,
        mut source: R,
        cancel: &CancellationToken,
        mut session: Session<'_>,
    ) -> TransferResult<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let removed = self
            .store
            .delete_by_parent(self.parent_id, session.as_deref_mut())
            .await?;
        if removed > 0 {
            debug!(parent_id = %self.parent_id, removed, "removed chunks of previous upload");
        }

        let mut read_buf = vec![0u8; READ_UNIT];
        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransferError::Canceled),
                read = source.read(&mut read_buf) => read?,
            };
            if read == 0 {
                break;
            }
            upload.buffer.extend_from_slice(&read_buf[..read]);

            while upload.buffer.len() >= upload.chunk_size {
                if cancel.is_cancelled() {
                    return Err(TransferError::Canceled);
                }
                let data = upload.buffer.split_to(upload.chunk_size).freeze();
                self.flush(upload, data, false, session.as_deref_mut()).await?;
            }
        }

        if !upload.buffer.is_empty() {
            if cancel.is_cancelled() {
                return Err(TransferError::Canceled);
            }
            let data = upload.buffer.split().freeze();
            self.flush(upload, data, true, session.as_deref_mut()).await?;
        }

        if upload.file_size == 0 {
            return Err(TransferError::EmptySource);
        }
        upload.upload_successful = true;
        Ok(())
    }

    async fn flush(
        &self,
        upload: &mut UploadSession,
        data: Bytes,
        terminal: bool,
        session: Session<'_>,
    ) -> TransferResult<()> {
        let len = data.len();
        let chunk = ChunkRecord::new(upload.parent_id, i64::from(upload.chunk_count), data);
        self.store.insert(&chunk, session).await?;
        upload.chunk_count += 1;
        upload.file_size += len as u64;
        debug!(
            parent_id = %upload.parent_id,
            seq = chunk.seq,
            bytes = len,
            terminal,
            "flushed chunk"
        );
        Ok(())
    }

    /// Reset the counters and remove every chunk written for this parent.
    async fn clean_up(
        &self,
        upload: &mut UploadSession,
        error: TransferError,
        session: Session<'_>,
    ) -> TransferError {
        upload.reset();
        match self.store.delete_by_parent(self.parent_id, session).await {
            Ok(removed) => {
                warn!(parent_id = %self.parent_id, removed, error = %error, "upload failed, chunks removed");
                error
            }
            Err(cleanup) => {
                warn!(
                    parent_id = %self.parent_id,
                    error = %error,
                    cleanup_error = %cleanup,
                    "upload failed and chunk cleanup failed"
                );
                TransferError::CleanupFailed {
                    source: Box::new(error),
                    cleanup: Box::new(cleanup),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_size_bounds_are_inclusive() {
        assert_eq!(chunk_size_bytes(128).unwrap(), 131_072);
        assert_eq!(chunk_size_bytes(4096).unwrap(), 4_194_304);
        assert!(chunk_size_bytes(127).unwrap_err().is_validation());
        assert!(chunk_size_bytes(4097).unwrap_err().is_validation());
        assert!(chunk_size_bytes(0).is_err());
    }

    #[test]
    fn reset_clears_totals_and_buffer() {
        let mut upload = UploadSession::new(Uuid::new_v4(), 1024);
        upload.buffer.extend_from_slice(b"pending");
        upload.file_size = 10;
        upload.chunk_count = 2;
        upload.upload_successful = true;

        upload.reset();
        assert!(upload.buffer.is_empty());
        assert_eq!(upload.metadata(), FileMetadata::default());
    }
}
