//! Chunk record primitives and the ordered, batched cursor built on them.

use crate::models::chunk::{ChunkPayload, ChunkRecord};
use crate::services::errors::{TransferError, TransferResult};
use async_trait::async_trait;
use bytes::Bytes;
use sqlx::SqliteConnection;
use uuid::Uuid;

/// An optional caller-owned transactional session.
///
/// It is handed to every store call of one pipeline run and never begun,
/// committed or closed here.
pub type Session<'a> = Option<&'a mut SqliteConnection>;

/// CRUD primitives over the chunk collection.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Insert one chunk record.
    async fn insert(&self, chunk: &ChunkRecord, session: Session<'_>) -> TransferResult<()>;

    /// Remove every chunk of `parent_id`, returning how many were removed.
    /// Removing nothing is not an error.
    async fn delete_by_parent(&self, parent_id: Uuid, session: Session<'_>)
    -> TransferResult<u64>;

    /// Fetch up to `limit` payloads of `parent_id` with `seq` greater than
    /// `after`, ordered by `seq`.
    async fn fetch_batch(
        &self,
        parent_id: Uuid,
        after: Option<i64>,
        limit: u32,
        session: Session<'_>,
    ) -> TransferResult<Vec<ChunkPayload>>;
}

/// Open a forward-only cursor over the chunks of `parent_id`.
pub fn open_ordered_cursor<S>(
    store: &S,
    parent_id: Uuid,
    batch_size: u32,
) -> TransferResult<ChunkCursor<'_, S>>
where
    S: ChunkStore + ?Sized,
{
    if batch_size == 0 {
        return Err(TransferError::validation("batch size must be at least 1"));
    }
    Ok(ChunkCursor {
        store,
        parent_id,
        batch_size,
        last_seq: None,
        exhausted: false,
    })
}

/// Lazy, finite sequence of chunk payloads fetched `batch_size` at a time.
///
/// Not restartable: open a new cursor to read from the start again.
pub struct ChunkCursor<'a, S: ?Sized> {
    store: &'a S,
    parent_id: Uuid,
    batch_size: u32,
    last_seq: Option<i64>,
    exhausted: bool,
}

impl<S> ChunkCursor<'_, S>
where
    S: ChunkStore + ?Sized,
{
    /// Next batch of payloads in order, `None` once the cursor is drained.
    pub async fn next_batch(&mut self, session: Session<'_>) -> TransferResult<Option<Vec<Bytes>>> {
        if self.exhausted {
            return Ok(None);
        }

        let batch = self
            .store
            .fetch_batch(self.parent_id, self.last_seq, self.batch_size, session)
            .await?;

        // a short page means there is nothing after it
        if batch.len() < self.batch_size as usize {
            self.exhausted = true;
        }
        match batch.last() {
            Some(last) => self.last_seq = Some(last.seq),
            None => return Ok(None),
        }

        Ok(Some(batch.into_iter().map(|chunk| chunk.data).collect()))
    }
}
