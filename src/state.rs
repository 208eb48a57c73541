//! Shared state handed to every HTTP handler.

use crate::{
    config::AppConfig,
    services::{document_store::SqliteDocumentStore, transfer_service::TransferService},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub transfers: TransferService<SqliteDocumentStore>,

    /// Chunk size used when an upload does not ask for one.
    pub chunk_size_kb: u32,

    /// Batch size used when a download does not ask for one.
    pub batch_size: u32,
}

impl AppState {
    pub fn new(store: SqliteDocumentStore, cfg: &AppConfig) -> Self {
        Self {
            transfers: TransferService::new(Arc::new(store)),
            chunk_size_kb: cfg.chunk_size_kb,
            batch_size: cfg.batch_size,
        }
    }

    pub fn store(&self) -> &SqliteDocumentStore {
        self.transfers.store().as_ref()
    }
}
