//! Download pipeline: ordered chunk cursor -> output sink.

use crate::services::{
    chunk_store::{ChunkStore, Session, open_ordered_cursor},
    errors::{TransferError, TransferResult},
    metadata_writer::MetadataWriter,
};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Streams the chunks of one parent object into a sink, in order.
pub struct DownloadPipeline<'a, S: ?Sized> {
    store: &'a S,
    parent_id: Uuid,
    batch_size: u32,
}

impl<'a, S> DownloadPipeline<'a, S>
where
    S: ChunkStore + MetadataWriter + ?Sized,
{
    pub fn new(store: &'a S, parent_id: Uuid, batch_size: u32) -> TransferResult<Self> {
        if batch_size == 0 {
            return Err(TransferError::validation("batch size must be at least 1"));
        }
        Ok(Self {
            store,
            parent_id,
            batch_size,
        })
    }

    /// Fail unless the parent is saved and its last upload succeeded.
    pub async fn check_readable(&self, session: Session<'_>) -> TransferResult<()> {
        match self.store.load(self.parent_id, session).await? {
            None => Err(TransferError::UnsavedParent(self.parent_id)),
            Some(meta) if !meta.upload_successful => Err(TransferError::state(
                "no successful upload: data for this file has not been uploaded successfully",
            )),
            Some(_) => Ok(()),
        }
    }

    /// Write every chunk to `sink`, returning the number of bytes written.
    ///
    /// Cancellation is observed between chunks; on cancellation the sink
    /// keeps the whole chunks written so far.
    pub async fn run<W>(
        &self,
        sink: &mut W,
        cancel: &CancellationToken,
        mut session: Session<'_>,
    ) -> TransferResult<u64>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        self.check_readable(session.as_deref_mut()).await?;

        let mut cursor = open_ordered_cursor(self.store, self.parent_id, self.batch_size)?;
        let mut written = 0u64;
        let mut chunks = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(TransferError::Canceled);
            }
            let Some(batch) = cursor.next_batch(session.as_deref_mut()).await? else {
                break;
            };
            debug!(parent_id = %self.parent_id, chunks = batch.len(), "fetched chunk batch");

            for data in batch {
                if cancel.is_cancelled() {
                    sink.flush().await?;
                    return Err(TransferError::Canceled);
                }
                sink.write_all(&data).await?;
                written += data.len() as u64;
                chunks += 1;
            }
        }

        sink.flush().await?;
        debug!(parent_id = %self.parent_id, bytes = written, chunks, "download complete");
        Ok(written)
    }
}
