//! Common test utilities for ingestion server integration tests.
//!
//! Builds the full component stack on in-memory stores, with every
//! downstream stage service answered by a single wiremock server (the
//! stage paths do not overlap, so one server can play all seven roles).
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use docprep_server::api::{create_router, AppState};
use docprep_server::clients::PipelineClients;
use docprep_server::config::{CorsConfig, PipelineConfig, ServicesConfig};
use docprep_server::ingestion::IngestionService;
use docprep_server::models::{ItemStatus, PipelineItem};
use docprep_server::pipeline::PipelineExecutor;
use docprep_server::queue::{JobQueue, RetryPolicy};
use docprep_server::storage::{MemoryObjectStore, ObjectStore};
use docprep_server::store::{ItemStore, MemoryItemStore};

pub struct TestApp {
    pub app: Router,
    pub store: Arc<MemoryItemStore>,
    pub objects: Arc<MemoryObjectStore>,
    pub service: Arc<IngestionService>,
    pub queue: JobQueue,
    pub mock: MockServer,
}

/// Pipeline tuning for tests: tiny batches and fast retries.
pub fn test_pipeline_config() -> PipelineConfig {
    PipelineConfig {
        embedding_batch_size: 2,
        hierarchical_extraction: false,
        guard_enabled: false,
        worker_count: 2,
        max_job_attempts: 2,
        retry_base_delay_ms: 5,
        retry_max_delay_ms: 20,
        sync_interval_secs: 0,
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(test_pipeline_config()).await
}

pub async fn spawn_app_with(pipeline: PipelineConfig) -> TestApp {
    let mock = MockServer::start().await;
    let store = Arc::new(MemoryItemStore::new());
    let objects = Arc::new(MemoryObjectStore::new());

    let clients = Arc::new(
        PipelineClients::new(ServicesConfig::all_at(&mock.uri())).expect("client construction"),
    );

    let store_dyn: Arc<dyn ItemStore> = store.clone();
    let objects_dyn: Arc<dyn ObjectStore> = objects.clone();

    let executor = Arc::new(PipelineExecutor::new(
        Arc::clone(&store_dyn),
        Arc::clone(&objects_dyn),
        clients,
        pipeline.clone(),
    ));
    let queue = JobQueue::start(
        executor,
        RetryPolicy::from_config(&pipeline),
        pipeline.worker_count,
    );
    let service = Arc::new(IngestionService::new(store_dyn, objects_dyn, queue.clone()));

    let state = AppState {
        service: Arc::clone(&service),
    };
    let cors = CorsConfig {
        allowed_origins: vec!["*".to_string()],
        allow_credentials: false,
    };
    let app = create_router(state, &cors);

    TestApp {
        app,
        store,
        objects,
        service,
        queue,
        mock,
    }
}

// ============================================================================
// Downstream Service Mocks
// ============================================================================

/// Mount responders for a run that succeeds end to end, splitting into the
/// given chunk texts.
pub async fn mount_happy_pipeline(mock: &MockServer, chunk_texts: &[&str]) {
    mount_owner_purge(mock).await;
    mount_extractor(mock, ResponseTemplate::new(200).set_body_json(extracted_body())).await;

    Mock::given(method("POST"))
        .and(path("/compress"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "loaded_docs": [doc_json("compressed text")] })),
        )
        .mount(mock)
        .await;

    let chunks: Vec<Value> = chunk_texts.iter().map(|text| doc_json(text)).collect();
    Mock::given(method("POST"))
        .and(path("/split"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "docs": chunks })))
        .mount(mock)
        .await;

    mount_embed_and_ingest(mock).await;
}

pub async fn mount_owner_purge(mock: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/delete"))
        .respond_with(ResponseTemplate::new(200))
        .mount(mock)
        .await;
}

pub async fn mount_extractor(mock: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/extract"))
        .respond_with(response)
        .mount(mock)
        .await;
}

pub async fn mount_embed_and_ingest(mock: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [[0.1, 0.2, 0.3]] })),
        )
        .mount(mock)
        .await;
    Mock::given(method("POST"))
        .and(path("/ingest"))
        .respond_with(ResponseTemplate::new(200))
        .mount(mock)
        .await;
}

/// Guard configuration endpoint plus a scan responder.
pub async fn mount_guard(mock: &MockServer, scan_response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/guardrail_params"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "scanners": [] })))
        .mount(mock)
        .await;
    Mock::given(method("POST"))
        .and(path("/scan"))
        .respond_with(scan_response)
        .mount(mock)
        .await;
}

pub fn doc_json(text: &str) -> Value {
    json!({ "text": text, "metadata": {} })
}

pub fn extracted_body() -> Value {
    json!({ "loaded_docs": [doc_json("extracted text")] })
}

/// Number of recorded requests that hit the given path.
pub async fn requests_to(mock: &MockServer, to: &str) -> usize {
    mock.received_requests()
        .await
        .expect("request recording enabled")
        .iter()
        .filter(|request| request.url.path() == to)
        .count()
}

/// Bodies of recorded requests that hit the given path.
pub async fn request_bodies(mock: &MockServer, to: &str) -> Vec<Value> {
    mock.received_requests()
        .await
        .expect("request recording enabled")
        .iter()
        .filter(|request| request.url.path() == to)
        .map(|request| request.body_json().expect("request body is json"))
        .collect()
}

// ============================================================================
// Store Helpers
// ============================================================================

/// Poll the store until the item satisfies the predicate.
pub async fn wait_for_item<F>(store: &MemoryItemStore, id: Uuid, pred: F) -> PipelineItem
where
    F: Fn(&PipelineItem) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let mut last_status = None;
    loop {
        if let Ok(Some(item)) = store.get(id).await {
            if pred(&item) {
                return item;
            }
            last_status = Some(item.status);
        }
        if tokio::time::Instant::now() > deadline {
            panic!(
                "item {} did not reach the expected state (last status: {:?})",
                id, last_status
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn wait_for_status(store: &MemoryItemStore, id: Uuid, status: ItemStatus) -> PipelineItem {
    wait_for_item(store, id, |item| item.status == status).await
}

/// Poll the store until the row is gone.
pub async fn wait_for_removal(store: &MemoryItemStore, id: Uuid) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if matches!(store.get(id).await, Ok(None)) {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("item {} was not removed", id);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ============================================================================
// Request Helpers
// ============================================================================

/// Helper to send a GET request
pub async fn get_request(app: &Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body_str = String::from_utf8(body.to_vec()).unwrap();

    (status, body_str)
}

/// Helper to send a POST request with a JSON body
pub async fn post_request(app: &Router, uri: &str, body: Value) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .method("POST")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let response_body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body_str = String::from_utf8(response_body.to_vec()).unwrap();

    (status, body_str)
}

/// Helper to send a POST request without a body
pub async fn post_empty(app: &Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .method("POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body_str = String::from_utf8(body.to_vec()).unwrap();

    (status, body_str)
}

/// Helper to send a DELETE request
pub async fn delete_request(app: &Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .method("DELETE")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body_str = String::from_utf8(body.to_vec()).unwrap();

    (status, body_str)
}

pub fn parse_json(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or(Value::Null)
}
