//! HTTP handlers for file entities and their chunked data.
//! Request and response bodies are streamed; only one chunk plus one read
//! unit of an upload is held in memory at a time.

use crate::{
    errors::AppError,
    models::file::StoredFile,
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::TryStreamExt;
use serde::Deserialize;
use std::{io, time::Duration};
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::warn;
use uuid::Uuid;

/// Capacity of the pipe between the download task and the response body.
const DOWNLOAD_PIPE_CAPACITY: usize = 64 * 1024;

/// Request body for `POST /files`.
#[derive(Debug, Deserialize)]
pub struct CreateFileReq {
    pub name: String,
    pub content_type: Option<String>,
}

/// Query params accepted by `PUT /files/{id}/data`.
#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub chunk_size_kb: Option<u32>,
    pub timeout_secs: Option<u64>,
}

/// Query params accepted by `GET /files/{id}/data`.
#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub batch_size: Option<u32>,
    pub timeout_secs: Option<u64>,
}

/// `POST /files` — create an empty file entity.
pub async fn create_file(
    State(state): State<AppState>,
    Json(payload): Json<CreateFileReq>,
) -> Result<impl IntoResponse, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::bad_request("file name must not be empty"));
    }
    let mut file = StoredFile::new(payload.name, payload.content_type);
    state.store().insert_parent(&mut file).await?;
    Ok((StatusCode::CREATED, Json(file)))
}

/// `GET /files/{id}` — entity with its transfer metadata.
pub async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<StoredFile>, AppError> {
    Ok(Json(fetch_file(&state, id).await?))
}

/// `PUT /files/{id}/data` — replace the file's data with the request body.
pub async fn upload_file_data(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<UploadQuery>,
    body: Body,
) -> Result<Json<StoredFile>, AppError> {
    let mut file = fetch_file(&state, id).await?;
    let chunk_size_kb = q.chunk_size_kb.unwrap_or(state.chunk_size_kb);

    let stream = body.into_data_stream().map_err(io::Error::other);
    let reader = StreamReader::new(Box::pin(stream));

    match q.timeout_secs {
        Some(secs) => {
            state
                .transfers
                .upload_data_with_timeout(
                    &mut file,
                    reader,
                    Duration::from_secs(secs),
                    chunk_size_kb,
                    None,
                )
                .await?
        }
        None => {
            state
                .transfers
                .upload_data(&mut file, reader, chunk_size_kb, None, None)
                .await?
        }
    }

    Ok(Json(file))
}

/// `GET /files/{id}/data` — stream the file's data back in chunk order.
///
/// Preconditions are checked before the response starts, so an unreadable
/// file yields an error status instead of an empty body.
pub async fn download_file_data(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<DownloadQuery>,
) -> Result<Response, AppError> {
    let file = fetch_file(&state, id).await?;
    let batch_size = q.batch_size.unwrap_or(state.batch_size);
    if batch_size == 0 {
        return Err(AppError::bad_request("batch size must be at least 1"));
    }
    state.transfers.check_readable(&file, None).await?;

    let content_type = file
        .content_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".into());
    let content_length = file.metadata.file_size;

    let (mut writer, reader) = tokio::io::duplex(DOWNLOAD_PIPE_CAPACITY);
    let transfers = state.transfers.clone();
    tokio::spawn(async move {
        let result = match q.timeout_secs {
            Some(secs) => {
                transfers
                    .download_data_with_timeout(
                        &file,
                        &mut writer,
                        Duration::from_secs(secs),
                        batch_size,
                        None,
                    )
                    .await
            }
            None => {
                transfers
                    .download_data(&file, &mut writer, batch_size, None, None)
                    .await
            }
        };
        // dropping the writer ends the body; a short body signals the failure
        if let Err(err) = result {
            warn!(file_id = %id, error = %err, "download aborted");
        }
    });

    let mut response = Response::new(Body::from_stream(ReaderStream::new(reader)));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(content_length));
    *response.status_mut() = StatusCode::OK;
    Ok(response)
}

async fn fetch_file(state: &AppState, id: Uuid) -> Result<StoredFile, AppError> {
    state
        .store()
        .fetch_parent(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("file `{}` not found", id)))
}
