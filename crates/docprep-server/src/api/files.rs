//! File item endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use docprep_common::types::Pagination;

use super::AppState;
use crate::error::ApiResult;
use crate::models::{ItemKind, PipelineItem};

/// Hard cap on list page size.
const MAX_PAGE_SIZE: i64 = 500;

/// Registration payload for an object that already lives in storage.
///
/// Byte uploads go straight to the object store (normally via presigned
/// URL); this endpoint only tells the pipeline about them, exactly like a
/// bucket notification would.
#[derive(Debug, Deserialize)]
pub struct UploadFileRequest {
    pub bucket_name: String,
    pub object_name: String,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size: Option<i64>,
}

pub async fn list_files(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
) -> ApiResult<Json<Value>> {
    let files = state
        .service
        .list(ItemKind::File, pagination.clamped(MAX_PAGE_SIZE))
        .await?;
    Ok(Json(json!({ "files": files })))
}

pub async fn upload_file(
    State(state): State<AppState>,
    Json(request): Json<UploadFileRequest>,
) -> ApiResult<(StatusCode, Json<PipelineItem>)> {
    let item = state
        .service
        .register_file(
            &request.bucket_name,
            &request.object_name,
            request.etag,
            request.content_type,
            request.size,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PipelineItem>> {
    Ok(Json(state.service.get(ItemKind::File, id).await?))
}

pub async fn retry_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PipelineItem>> {
    Ok(Json(state.service.retry(ItemKind::File, id).await?))
}

pub async fn cancel_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PipelineItem>> {
    Ok(Json(state.service.cancel(ItemKind::File, id).await?))
}

pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let item = state.service.delete(ItemKind::File, id).await?;
    Ok(Json(json!({
        "message": format!("file '{}' queued for deletion", item.id)
    })))
}
