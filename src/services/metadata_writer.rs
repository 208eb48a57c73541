//! Reads and writes the transfer metadata on parent documents.

use crate::models::file::FileMetadata;
use crate::services::chunk_store::Session;
use crate::services::errors::TransferResult;
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait MetadataWriter: Send + Sync {
    /// Idempotently create the index on the chunk parent linkage.
    async fn ensure_index(&self, session: Session<'_>) -> TransferResult<()>;

    /// Current metadata of `parent_id`, `None` if the parent was never saved.
    async fn load(&self, parent_id: Uuid, session: Session<'_>)
    -> TransferResult<Option<FileMetadata>>;

    /// Write size, chunk count and success flag in a single update.
    ///
    /// This is the only place `upload_successful` changes.
    async fn finalize(
        &self,
        parent_id: Uuid,
        metadata: &FileMetadata,
        session: Session<'_>,
    ) -> TransferResult<()>;
}
