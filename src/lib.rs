//! Large-object storage over a document store with bounded record sizes.
//!
//! Payloads are split into chunk records on upload and stitched back
//! together in order on download, while the parent entity's size, chunk
//! count and success flag always describe what was durably written.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

pub use config::{AppConfig, CollectionConfig};
pub use models::file::{FileMetadata, HasChunkedStorage, StoredFile};
pub use services::{
    chunk_store::{ChunkStore, Session},
    document_store::SqliteDocumentStore,
    errors::{TransferError, TransferResult},
    metadata_writer::MetadataWriter,
    transfer_service::TransferService,
};
