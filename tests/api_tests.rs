// HTTP API tests driven through the router with `oneshot`.

mod common;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use chunked_object_store::{AppConfig, CollectionConfig, StoredFile, routes, state::AppState};
use common::{KIB, memory_store, pattern_bytes};
use serde_json::{Value, json};
use tower::ServiceExt;

async fn test_router() -> Router {
    let store = memory_store().await;
    let cfg = AppConfig {
        host: "127.0.0.1".into(),
        port: 0,
        database_url: "sqlite::memory:".into(),
        collections: CollectionConfig::default(),
        chunk_size_kb: 128,
        batch_size: 2,
    };
    routes::routes::routes().with_state(AppState::new(store, &cfg))
}

async fn body_bytes(body: Body) -> Vec<u8> {
    to_bytes(body, usize::MAX).await.unwrap().to_vec()
}

async fn create_file(router: &Router) -> StoredFile {
    let request = Request::builder()
        .method("POST")
        .uri("/files")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "name": "video.mp4", "content_type": "video/mp4" }).to_string(),
        ))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    serde_json::from_slice(&body_bytes(response.into_body()).await).unwrap()
}

#[tokio::test]
async fn healthz_is_ok() {
    let router = test_router().await;
    let request = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn readyz_checks_collections() {
    let router = test_router().await;
    let request = Request::builder().uri("/readyz").body(Body::empty()).unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = serde_json::from_slice(&body_bytes(response.into_body()).await).unwrap();
    assert_eq!(body["checks"]["collections"]["ok"], true);
}

#[tokio::test]
async fn upload_then_download_round_trips() {
    let router = test_router().await;
    let file = create_file(&router).await;
    let id = file.id.unwrap();
    let data = pattern_bytes(300 * KIB);

    let request = Request::builder()
        .method("PUT")
        .uri(format!("/files/{}/data", id))
        .body(Body::from(data.clone()))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let uploaded: StoredFile =
        serde_json::from_slice(&body_bytes(response.into_body()).await).unwrap();
    assert_eq!(uploaded.metadata.chunk_count, 3);
    assert_eq!(uploaded.metadata.file_size, 307_200);
    assert!(uploaded.metadata.upload_successful);

    let request = Request::builder()
        .uri(format!("/files/{}", id))
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let fetched: StoredFile =
        serde_json::from_slice(&body_bytes(response.into_body()).await).unwrap();
    assert_eq!(fetched.metadata, uploaded.metadata);

    let request = Request::builder()
        .uri(format!("/files/{}/data?batch_size=4", id))
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "video/mp4"
    );
    assert_eq!(body_bytes(response.into_body()).await, data);
}

#[tokio::test]
async fn download_before_upload_conflicts() {
    let router = test_router().await;
    let file = create_file(&router).await;

    let request = Request::builder()
        .uri(format!("/files/{}/data", file.id.unwrap()))
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn bad_upload_requests_are_rejected() {
    let router = test_router().await;
    let file = create_file(&router).await;
    let id = file.id.unwrap();

    let request = Request::builder()
        .method("PUT")
        .uri(format!("/files/{}/data?chunk_size_kb=64", id))
        .body(Body::from(vec![1u8; 10]))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method("PUT")
        .uri(format!("/files/{}/data", id))
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method("PUT")
        .uri(format!("/files/{}/data", uuid::Uuid::new_v4()))
        .body(Body::from(vec![1u8; 10]))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
