//! File entities and the capability that gives them chunked storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Transfer metadata persisted on the parent document.
///
/// `file_size` and the chunk set are only meaningful while
/// `upload_successful` is true.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FileMetadata {
    /// Total bytes durably written.
    pub file_size: u64,

    /// Number of chunk records written for the current generation.
    pub chunk_count: u32,

    /// Set only after the terminal chunk is durable.
    pub upload_successful: bool,
}

/// Any entity that can hold a chunked payload.
///
/// Implementors expose their identity and an explicit metadata field; the
/// transfer service does the rest.
pub trait HasChunkedStorage {
    /// Identity of the saved entity, `None` while unsaved.
    fn entity_id(&self) -> Option<Uuid>;

    fn file_metadata(&self) -> &FileMetadata;

    fn file_metadata_mut(&mut self) -> &mut FileMetadata;
}

/// The stock file entity stored in the parent collection.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StoredFile {
    /// Assigned when the entity is first saved.
    pub id: Option<Uuid>,

    /// Display name of the file.
    pub name: String,

    /// Content type (MIME type), if known.
    pub content_type: Option<String>,

    /// When this entity was created.
    pub created_at: DateTime<Utc>,

    #[serde(flatten)]
    pub metadata: FileMetadata,
}

impl StoredFile {
    /// A new, unsaved entity with empty metadata.
    pub fn new(name: impl Into<String>, content_type: Option<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            content_type,
            created_at: Utc::now(),
            metadata: FileMetadata::default(),
        }
    }
}

impl HasChunkedStorage for StoredFile {
    fn entity_id(&self) -> Option<Uuid> {
        self.id
    }

    fn file_metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    fn file_metadata_mut(&mut self) -> &mut FileMetadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entity_is_unsaved_and_unreadable() {
        let file = StoredFile::new("report.pdf", Some("application/pdf".into()));
        assert!(file.entity_id().is_none());
        assert_eq!(*file.file_metadata(), FileMetadata::default());
        assert!(!file.file_metadata().upload_successful);
    }

    #[test]
    fn metadata_serializes_flat() {
        let mut file = StoredFile::new("a.bin", None);
        file.metadata.file_size = 42;
        file.metadata.chunk_count = 1;
        file.metadata.upload_successful = true;

        let value = serde_json::to_value(&file).unwrap();
        assert_eq!(value["file_size"], 42);
        assert_eq!(value["chunk_count"], 1);
        assert_eq!(value["upload_successful"], true);
    }
}
