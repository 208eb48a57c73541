//! One bounded-size segment of a parent object's payload.

use bytes::Bytes;
use uuid::Uuid;

/// A chunk record as written to the chunk collection.
///
/// Chunks are owned exclusively by their parent; `seq` is assigned in flush
/// order and is the only ordering the store relies on.
#[derive(Clone, Debug)]
pub struct ChunkRecord {
    /// Generated identity of the record.
    pub id: Uuid,

    /// Foreign key to the owning file entity.
    pub parent_id: Uuid,

    /// Zero-based position of this chunk within the upload.
    pub seq: i64,

    /// Raw payload bytes.
    pub data: Bytes,
}

impl ChunkRecord {
    pub fn new(parent_id: Uuid, seq: i64, data: Bytes) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id,
            seq,
            data,
        }
    }
}

/// Projection returned by ordered cursors: position and payload only.
#[derive(Clone, Debug)]
pub struct ChunkPayload {
    pub seq: i64,
    pub data: Bytes,
}
