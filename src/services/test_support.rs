//! Shared fixtures for unit tests.

use crate::config::CollectionConfig;
use crate::services::document_store::SqliteDocumentStore;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;

/// A migrated store on a private in-memory database.
///
/// One connection that is never reaped, since every connection to
/// `sqlite::memory:` opens a fresh database.
pub async fn memory_store() -> SqliteDocumentStore {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    let store = SqliteDocumentStore::new(Arc::new(pool), CollectionConfig::default());
    store.migrate().await.expect("migrate");
    store
}
