//! Defines routes for file entities and their chunked data.
//!
//! ## Structure
//! - **Entity endpoints**
//!   - `POST /files`      — create an empty file entity
//!   - `GET  /files/{id}` — entity with size, chunk count and success flag
//!
//! - **Data endpoints**
//!   - `PUT  /files/{id}/data` — upload (`?chunk_size_kb=&timeout_secs=`)
//!   - `GET  /files/{id}/data` — download (`?batch_size=&timeout_secs=`)

use crate::{
    handlers::{
        file_handlers::{create_file, download_file_data, get_file, upload_file_data},
        health_handlers::{healthz, readyz},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};

/// Build and return the router for all file routes.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/files", post(create_file))
        .route("/files/{id}", get(get_file))
        .route(
            "/files/{id}/data",
            put(upload_file_data)
                .get(download_file_data)
                // uploads are streamed into bounded chunks, so no body cap
                .layer(DefaultBodyLimit::disable()),
        )
}
